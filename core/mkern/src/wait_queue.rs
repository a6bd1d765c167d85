//! Priority-ordered waiter lists for semaphores.
//!
//! Waiters are inserted in effective-priority order with FIFO ties, but
//! donations can change priorities while threads sit in the list, so the
//! stored order is advisory. Release-side operations scan for the current
//! maximum instead of trusting it; taking the first-encountered maximum
//! yields the same thread a stable re-sort plus pop would.

use crate::list::ListHead;
use crate::task::{QueueId, ThreadRef, ThreadTable};

pub(crate) struct WaitQueue {
    list: ListHead,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            list: ListHead::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn front(&self) -> Option<ThreadRef> {
        self.list.front()
    }

    /// Insert by effective priority, descending; after existing equals.
    pub fn insert_ordered(&mut self, table: &mut ThreadTable, r: ThreadRef) {
        let prio = table.get(r).effective_priority;
        let mut at = self.list.front();
        while let Some(n) = at {
            if table.get(n).effective_priority < prio {
                break;
            }
            at = self.list.next(table, n);
        }
        match at {
            Some(n) => self.list.insert_before(table, n, r, QueueId::Wait),
            None => self.list.push_back(table, r, QueueId::Wait),
        }
    }

    /// Unlink and return the highest-priority waiter at its *current*
    /// effective priority, first among equals.
    pub fn remove_highest(&mut self, table: &mut ThreadTable) -> Option<ThreadRef> {
        let mut best: Option<(ThreadRef, u8)> = None;
        let mut cur = self.list.front();
        while let Some(n) = cur {
            let prio = table.get(n).effective_priority;
            match best {
                Some((_, b)) if b >= prio => {}
                _ => best = Some((n, prio)),
            }
            cur = self.list.next(table, n);
        }
        let (r, _) = best?;
        self.list.remove(table, r);
        Some(r)
    }

    /// Maximum effective priority among the waiters, scanning the whole
    /// list (the stored order may be stale).
    pub fn max_priority(&self, table: &ThreadTable) -> Option<u8> {
        let mut max: Option<u8> = None;
        let mut cur = self.list.front();
        while let Some(n) = cur {
            let prio = table.get(n).effective_priority;
            max = Some(max.map_or(prio, |m| m.max(prio)));
            cur = self.list.next(table, n);
        }
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_insert_with_fifo_ties() {
        let mut table = ThreadTable::new();
        let mut wq = WaitQueue::new();
        let a = table.alloc("a", 31, None).unwrap();
        let b = table.alloc("b", 40, None).unwrap();
        let c = table.alloc("c", 31, None).unwrap();
        wq.insert_ordered(&mut table, a);
        wq.insert_ordered(&mut table, b);
        wq.insert_ordered(&mut table, c);
        // b leads; c entered after its equal a
        assert_eq!(wq.front(), Some(b));
        assert_eq!(wq.remove_highest(&mut table), Some(b));
        assert_eq!(wq.remove_highest(&mut table), Some(a));
        assert_eq!(wq.remove_highest(&mut table), Some(c));
        assert!(wq.is_empty());
    }

    #[test]
    fn removal_sees_drifted_priorities() {
        let mut table = ThreadTable::new();
        let mut wq = WaitQueue::new();
        let a = table.alloc("a", 20, None).unwrap();
        let b = table.alloc("b", 30, None).unwrap();
        wq.insert_ordered(&mut table, a);
        wq.insert_ordered(&mut table, b);
        // a receives a donation while queued; the list order is now stale
        table.get_mut(a).effective_priority = 50;
        assert_eq!(wq.remove_highest(&mut table), Some(a));
        assert_eq!(wq.remove_highest(&mut table), Some(b));
    }

    #[test]
    fn max_priority_scans() {
        let mut table = ThreadTable::new();
        let mut wq = WaitQueue::new();
        assert_eq!(wq.max_priority(&table), None);
        let a = table.alloc("a", 10, None).unwrap();
        let b = table.alloc("b", 25, None).unwrap();
        wq.insert_ordered(&mut table, a);
        wq.insert_ordered(&mut table, b);
        table.get_mut(a).effective_priority = 60;
        assert_eq!(wq.max_priority(&table), Some(60));
        assert_eq!(wq.len(), 2);
    }
}
