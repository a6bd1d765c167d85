//! The ready queue: one FIFO bucket per priority level plus an occupancy
//! bitmap, so picking the next thread is a count-leading-zeros away.

use crate::list::ListHead;
use crate::task::{QueueId, ThreadRef, ThreadTable};

pub(crate) struct ReadyQueue {
    buckets: [ListHead; mcfg::PRI_LEVELS],
    occupied: u64,
    len: usize,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            buckets: [const { ListHead::new() }; mcfg::PRI_LEVELS],
            occupied: 0,
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `r` to the tail of its effective-priority bucket. Equal
    /// priorities are FIFO.
    pub fn enqueue(&mut self, table: &mut ThreadTable, r: ThreadRef) {
        let prio = table.get(r).effective_priority as usize;
        self.buckets[prio].push_back(table, r, QueueId::Ready);
        self.occupied |= 1 << prio;
        self.len += 1;
    }

    /// Take the longest-waiting thread of the highest occupied priority.
    pub fn pop_highest(&mut self, table: &mut ThreadTable) -> Option<ThreadRef> {
        if self.occupied == 0 {
            return None;
        }
        let prio = 63 - self.occupied.leading_zeros() as usize;
        let r = self.buckets[prio]
            .pop_front(table)
            .expect("ready bitmap out of sync with buckets");
        if self.buckets[prio].is_empty() {
            self.occupied &= !(1 << prio);
        }
        self.len -= 1;
        Some(r)
    }

    /// Unlink `r` from the bucket it was enqueued into. `prio` must be the
    /// effective priority it was enqueued at, which may differ from its
    /// current one mid-donation.
    pub fn remove(&mut self, table: &mut ThreadTable, r: ThreadRef, prio: u8) {
        let prio = prio as usize;
        self.buckets[prio].remove(table, r);
        if self.buckets[prio].is_empty() {
            self.occupied &= !(1 << prio);
        }
        self.len -= 1;
    }

    /// Effective priority of the thread that would run next.
    pub fn head_priority(&self) -> Option<u8> {
        if self.occupied == 0 {
            None
        } else {
            Some(63 - self.occupied.leading_zeros() as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_at(table: &mut ThreadTable, prio: u8) -> ThreadRef {
        table.alloc("t", prio, None).unwrap()
    }

    #[test]
    fn highest_priority_first() {
        let mut table = ThreadTable::new();
        let mut rq = ReadyQueue::new();
        let low = spawn_at(&mut table, 10);
        let high = spawn_at(&mut table, 50);
        let mid = spawn_at(&mut table, 31);
        rq.enqueue(&mut table, low);
        rq.enqueue(&mut table, high);
        rq.enqueue(&mut table, mid);
        assert_eq!(rq.head_priority(), Some(50));
        assert_eq!(rq.pop_highest(&mut table), Some(high));
        assert_eq!(rq.pop_highest(&mut table), Some(mid));
        assert_eq!(rq.pop_highest(&mut table), Some(low));
        assert_eq!(rq.pop_highest(&mut table), None);
        assert!(rq.is_empty());
    }

    #[test]
    fn equal_priorities_are_fifo() {
        let mut table = ThreadTable::new();
        let mut rq = ReadyQueue::new();
        let a = spawn_at(&mut table, 31);
        let b = spawn_at(&mut table, 31);
        let c = spawn_at(&mut table, 31);
        for r in [a, b, c] {
            rq.enqueue(&mut table, r);
        }
        assert_eq!(rq.pop_highest(&mut table), Some(a));
        assert_eq!(rq.pop_highest(&mut table), Some(b));
        assert_eq!(rq.pop_highest(&mut table), Some(c));
    }

    #[test]
    fn remove_reposition_on_donation() {
        let mut table = ThreadTable::new();
        let mut rq = ReadyQueue::new();
        let a = spawn_at(&mut table, 10);
        let b = spawn_at(&mut table, 20);
        rq.enqueue(&mut table, a);
        rq.enqueue(&mut table, b);
        // donate priority 40 to `a` while it sits in the ready queue
        rq.remove(&mut table, a, 10);
        table.get_mut(a).effective_priority = 40;
        rq.enqueue(&mut table, a);
        assert_eq!(rq.pop_highest(&mut table), Some(a));
        assert_eq!(rq.pop_highest(&mut table), Some(b));
    }

    #[test]
    fn bitmap_tracks_emptied_buckets() {
        let mut table = ThreadTable::new();
        let mut rq = ReadyQueue::new();
        let a = spawn_at(&mut table, 63);
        rq.enqueue(&mut table, a);
        assert_eq!(rq.head_priority(), Some(63));
        rq.remove(&mut table, a, 63);
        assert_eq!(rq.head_priority(), None);
        assert!(rq.is_empty());
    }
}
