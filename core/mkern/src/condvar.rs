//! Mesa-style condition variables.
//!
//! Each waiter parks on its own single-use semaphore, allocated on its own
//! stack for the duration of the wait; the condition variable keeps a list
//! of pointers to them. Signalling is not atomic with the signaller letting
//! go of the lock, so woken threads must recheck their predicate in a loop.

use core::ptr::NonNull;

use mspin::{IrqSave, SpinRaw};

use crate::api::current_name;
use crate::lock::Lock;
use crate::sched::sched;
use crate::semaphore::Semaphore;

struct CondWaiter {
    sema: Semaphore,
}

/// Pointer to a waiter's stack-resident semaphore. Valid until that waiter
/// returns from its down(), which cannot happen before the signaller's
/// up() — and the pointer is unlinked before the up().
#[derive(Clone, Copy)]
struct CondWaiterPtr(NonNull<CondWaiter>);

unsafe impl Send for CondWaiterPtr {}

/// A condition variable, always used under some [`Lock`].
pub struct Condvar {
    waiters: SpinRaw<heapless::Vec<CondWaiterPtr, { mcfg::MAX_THREADS }>>,
}

impl Condvar {
    /// Create a condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: SpinRaw::new(heapless::Vec::new()),
        }
    }

    /// Atomically release `lock` and wait to be signalled, then re-acquire
    /// `lock` before returning. The caller must hold `lock`.
    ///
    /// Mesa semantics: the predicate may already be false again by the time
    /// the lock is re-acquired. Recheck in a loop.
    pub fn wait(&self, lock: &Lock) {
        assert!(!mhal::irq::in_irq(), "condition wait in interrupt context");
        assert!(
            lock.held_by_current_thread(),
            "{} waited on a condition without holding the lock",
            current_name()
        );
        let waiter = CondWaiter {
            sema: Semaphore::new(0),
        };
        {
            let _irq = IrqSave::new();
            if self
                .waiters
                .lock()
                .push(CondWaiterPtr(NonNull::from(&waiter)))
                .is_err()
            {
                panic!("condition variable waiter list is full");
            }
        }
        lock.release();
        waiter.sema.down();
        lock.acquire();
    }

    /// Wake the waiter whose thread has the highest effective priority, if
    /// any. The caller must hold `lock`.
    pub fn signal(&self, lock: &Lock) {
        self.signal_one(lock);
    }

    /// Wake every waiter. The caller must hold `lock`.
    pub fn broadcast(&self, lock: &Lock) {
        while self.signal_one(lock) {}
    }

    fn signal_one(&self, lock: &Lock) -> bool {
        assert!(!mhal::irq::in_irq(), "condition signal in interrupt context");
        assert!(
            lock.held_by_current_thread(),
            "{} signalled a condition without holding the lock",
            current_name()
        );
        let target = {
            let _irq = IrqSave::new();
            let mut waiters = self.waiters.lock();
            if waiters.is_empty() {
                None
            } else {
                let guard = sched().lock();
                // Rank each entry by its sole waiter's current priority. A
                // waiter that has not reached its down() yet ranks lowest;
                // first among equals wins.
                let mut best: Option<(usize, i16)> = None;
                for (i, w) in waiters.iter().enumerate() {
                    // Safety: entries point at live wait frames; see
                    // `CondWaiterPtr`.
                    let prio = unsafe { w.0.as_ref() }
                        .sema
                        .front_waiter()
                        .map(|r| guard.table.get(r).effective_priority as i16)
                        .unwrap_or(-1);
                    match best {
                        Some((_, b)) if b >= prio => {}
                        _ => best = Some((i, prio)),
                    }
                }
                let (i, _) = best.expect("non-empty waiter list");
                Some(waiters.remove(i))
            }
        };
        match target {
            Some(w) => {
                // Safety: unlinked above, so nobody else will up it; the
                // wait frame lives until this up lets it return.
                unsafe { w.0.as_ref() }.sema.up();
                true
            }
            None => false,
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
