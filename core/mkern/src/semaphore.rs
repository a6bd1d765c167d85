//! Counting semaphores.
//!
//! The waiter list is kept in priority order on insert, and the release
//! path re-evaluates priorities when it picks a thread to wake: donations
//! may have reshuffled urgency while waiters slept.

use mspin::{IrqSave, SpinRaw};

use crate::sched::{preempt_check, reschedule, sched};
use crate::task::{ThreadRef, ThreadState, ThreadTable};
use crate::wait_queue::WaitQueue;

struct SemaInner {
    value: usize,
    waiters: WaitQueue,
}

/// A counting semaphore: a non-negative value with atomic down ("P") and
/// up ("V") operations.
pub struct Semaphore {
    inner: SpinRaw<SemaInner>,
}

impl Semaphore {
    /// Create a semaphore holding `value` permits.
    pub const fn new(value: usize) -> Self {
        Self {
            inner: SpinRaw::new(SemaInner {
                value,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Wait until the value is positive, then decrement it.
    ///
    /// May block, so it must not be called from interrupt context. It may
    /// be called with interrupts already disabled.
    pub fn down(&self) {
        assert!(
            !mhal::irq::in_irq(),
            "semaphore down in interrupt context"
        );
        debug_assert!(mhal::context::on_kernel_thread());
        let _irq = IrqSave::new();
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.value > 0 {
                    inner.value -= 1;
                    return;
                }
                let mut guard = sched().lock();
                let s = &mut *guard;
                let cur = s.current;
                debug_assert!(cur != s.idle, "idle thread blocking");
                s.table.get_mut(cur).state = ThreadState::Blocked;
                inner.waiters.insert_ordered(&mut s.table, cur);
            }
            // Interrupts are still off: nothing can slip between queuing
            // ourselves above and leaving the CPU here.
            reschedule();
        }
    }

    /// Decrement the value if it is positive, without waiting.
    ///
    /// Safe from interrupt context.
    pub fn try_down(&self) -> bool {
        let _irq = IrqSave::new();
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increment the value and wake the most urgent waiter, if any.
    ///
    /// Safe from interrupt context. May preempt the caller if the woken
    /// thread is more urgent.
    pub fn up(&self) {
        let woke = {
            let _irq = IrqSave::new();
            let mut inner = self.inner.lock();
            let woke = {
                let mut guard = sched().lock();
                let s = &mut *guard;
                match inner.waiters.remove_highest(&mut s.table) {
                    Some(w) => {
                        s.unblock(w);
                        true
                    }
                    None => false,
                }
            };
            inner.value += 1;
            woke
        };
        if woke {
            preempt_check();
        }
    }

    /// Current value. Advisory: it may change before the caller looks at it.
    pub fn value(&self) -> usize {
        let _irq = IrqSave::new();
        self.inner.lock().value
    }

    /// Maximum effective priority among the waiters. For the lock release
    /// path's donation recomputation.
    pub(crate) fn max_waiter_priority(&self, table: &ThreadTable) -> Option<u8> {
        self.inner.lock().waiters.max_priority(table)
    }

    /// Front of the waiter list. For condition variables, whose per-wait
    /// semaphores have at most one waiter.
    pub(crate) fn front_waiter(&self) -> Option<ThreadRef> {
        self.inner.lock().waiters.front()
    }
}
