//! Tick accounting, sleeping, and sub-tick delays.
//!
//! The tick handler runs in interrupt context: it charges the running
//! thread's quantum, wakes expired sleepers, and defers any preemption to
//! interrupt return. Sleeps of less than one tick busy-wait through a loop
//! calibrated once against the running tick.

use lazyinit::LazyInit;
use mspin::IrqSave;

use crate::list::ListHead;
use crate::sched::{reschedule, sched};
use crate::task::{QueueId, ThreadRef, ThreadState, ThreadTable};

/// Threads blocked until a wake deadline, ordered by deadline ascending so
/// the tick handler pops from the front until it hits the future.
pub(crate) struct SleepQueue {
    list: ListHead,
}

impl SleepQueue {
    pub const fn new() -> Self {
        Self {
            list: ListHead::new(),
        }
    }

    pub fn insert(&mut self, table: &mut ThreadTable, r: ThreadRef) {
        let wake_at = table.get(r).wake_at;
        let mut at = self.list.front();
        while let Some(n) = at {
            if table.get(n).wake_at > wake_at {
                break;
            }
            at = self.list.next(table, n);
        }
        match at {
            Some(n) => self.list.insert_before(table, n, r, QueueId::Sleep),
            None => self.list.push_back(table, r, QueueId::Sleep),
        }
    }

    /// Unlink and return the front sleeper if its deadline has passed.
    pub fn pop_expired(&mut self, table: &mut ThreadTable, now: u64) -> Option<ThreadRef> {
        let head = self.list.front()?;
        if table.get(head).wake_at > now {
            return None;
        }
        self.list.remove(table, head);
        Some(head)
    }
}

static LOOPS_PER_TICK: LazyInit<u64> = LazyInit::new();

/// Ticks since the scheduler started.
pub fn ticks_now() -> u64 {
    let _irq = IrqSave::new();
    sched().lock().ticks
}

/// Ticks elapsed since `since`, a value previously returned by
/// [`ticks_now`].
pub fn elapsed(since: u64) -> u64 {
    ticks_now() - since
}

/// Block the current thread for at least `n` ticks. Non-positive `n`
/// returns immediately.
pub fn sleep_ticks(n: i64) {
    if n <= 0 {
        return;
    }
    assert!(!mhal::irq::in_irq(), "sleep in interrupt context");
    assert!(
        mhal::context::on_kernel_thread(),
        "sleep from outside the kernel"
    );
    let _irq = IrqSave::new();
    {
        let mut guard = sched().lock();
        let s = &mut *guard;
        let cur = s.current;
        let deadline = s.ticks + n as u64;
        {
            let t = s.table.get_mut(cur);
            t.state = ThreadState::Blocked;
            t.wake_at = deadline;
        }
        s.sleepers.insert(&mut s.table, cur);
        trace!("{} sleeping until tick {}", s.table.get(cur).tid, deadline);
    }
    reschedule();
}

/// The timer tick, run in interrupt context.
pub fn on_timer_tick() {
    debug_assert!(mhal::irq::in_irq(), "tick handler outside interrupt context");
    let request_yield = {
        let mut guard = sched().lock();
        let s = &mut *guard;
        s.ticks += 1;
        let now = s.ticks;
        let cur = s.current;
        if cur == s.idle {
            s.idle_ticks += 1;
        } else {
            s.kernel_ticks += 1;
        }
        s.table.get_mut(cur).slice_used += 1;
        let quantum_expired = s.table.get(cur).slice_used >= mcfg::TIME_SLICE;
        while let Some(w) = s.sleepers.pop_expired(&mut s.table, now) {
            trace!("waking {} at tick {}", s.table.get(w).tid, now);
            s.unblock(w);
        }
        quantum_expired || s.should_preempt()
    };
    if request_yield {
        mhal::irq::yield_on_return();
    }
}

/// Measure how many busy-wait loops fit in one tick. Must run once at boot,
/// with interrupts enabled, before any sub-tick sleep.
pub fn calibrate() {
    assert!(mhal::irq::is_enabled(), "calibration needs interrupts on");
    assert!(
        mhal::context::on_kernel_thread(),
        "calibration from outside the kernel"
    );
    if LOOPS_PER_TICK.is_inited() {
        return;
    }
    debug!("calibrating timer...");

    // Largest power of two still inside one tick.
    let mut loops: u64 = 1 << 10;
    while !too_many_loops(loops << 1) {
        loops <<= 1;
        assert!(loops != 0);
    }

    // Refine the next 8 bits.
    let high_bit = loops;
    let mut test_bit = high_bit >> 1;
    while test_bit != high_bit >> 10 {
        if !too_many_loops(high_bit | test_bit) {
            loops |= test_bit;
        }
        test_bit >>= 1;
    }

    LOOPS_PER_TICK.init_once(loops);
    debug!("{} loops/s", loops.saturating_mul(mcfg::TICK_HZ));
}

/// True if `loops` iterations outlast one timer tick.
fn too_many_loops(loops: u64) -> bool {
    // Wait for a tick boundary.
    let start = ticks_now();
    while ticks_now() == start {
        core::hint::spin_loop();
    }

    let start = ticks_now();
    mhal::time::busy_spin(loops);
    ticks_now() != start
}

/// Sleep for about `ms` milliseconds.
pub fn msleep(ms: u64) {
    real_time_sleep(ms, 1000);
}

/// Sleep for about `us` microseconds.
pub fn usleep(us: u64) {
    real_time_sleep(us, 1_000_000);
}

/// Sleep for about `ns` nanoseconds.
pub fn nsleep(ns: u64) {
    real_time_sleep(ns, 1_000_000_000);
}

/// Sleep for about `num`/`denom` seconds: at least a full tick's worth goes
/// through the sleep queue, anything shorter busy-waits for accuracy.
fn real_time_sleep(num: u64, denom: u64) {
    //   (num / denom) s
    //  ----------------- = num * TICK_HZ / denom ticks, rounded down.
    //  1 s / TICK_HZ ticks
    let ticks = num.saturating_mul(mcfg::TICK_HZ) / denom;

    assert!(mhal::irq::is_enabled(), "timed sleep with interrupts off");
    if ticks > 0 {
        sleep_ticks(ticks as i64);
    } else {
        let loops_per_tick = LOOPS_PER_TICK
            .get()
            .expect("timer not calibrated; call timers::calibrate() first");
        debug_assert_eq!(denom % 1000, 0);
        // Scale down by 1000 to keep the product in range.
        mhal::time::busy_spin(loops_per_tick * num / 1000 * mcfg::TICK_HZ / (denom / 1000));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_queue_orders_by_deadline() {
        let mut table = ThreadTable::new();
        let mut sq = SleepQueue::new();
        let late = table.alloc("late", 31, None).unwrap();
        let soon = table.alloc("soon", 31, None).unwrap();
        let mid = table.alloc("mid", 31, None).unwrap();
        table.get_mut(late).wake_at = 30;
        table.get_mut(soon).wake_at = 10;
        table.get_mut(mid).wake_at = 20;
        sq.insert(&mut table, late);
        sq.insert(&mut table, soon);
        sq.insert(&mut table, mid);

        assert_eq!(sq.pop_expired(&mut table, 5), None);
        assert_eq!(sq.pop_expired(&mut table, 10), Some(soon));
        assert_eq!(sq.pop_expired(&mut table, 15), None);
        assert_eq!(sq.pop_expired(&mut table, 30), Some(mid));
        assert_eq!(sq.pop_expired(&mut table, 30), Some(late));
        assert_eq!(sq.pop_expired(&mut table, 30), None);
    }

    #[test]
    fn equal_deadlines_wake_in_sleep_order() {
        let mut table = ThreadTable::new();
        let mut sq = SleepQueue::new();
        let a = table.alloc("a", 31, None).unwrap();
        let b = table.alloc("b", 31, None).unwrap();
        table.get_mut(a).wake_at = 10;
        table.get_mut(b).wake_at = 10;
        sq.insert(&mut table, a);
        sq.insert(&mut table, b);
        assert_eq!(sq.pop_expired(&mut table, 10), Some(a));
        assert_eq!(sq.pop_expired(&mut table, 10), Some(b));
    }
}
