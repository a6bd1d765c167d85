//! Non-recursive locks with multi-level priority donation.
//!
//! A lock is a holder field plus a semaphore initialized to one. What earns
//! it a module of its own is donation: when a thread blocks on a held lock
//! it lends the holder its urgency, transitively along the chain of holders
//! blocked on further locks, so a low-priority holder cannot shut out a
//! high-priority waiter by languishing behind mid-priority threads.
//!
//! Donations are never cached. On release the holder's effective priority
//! is recomputed from scratch by scanning the waiters of every lock it
//! still holds; the waiter lists' sort order is advisory since priorities
//! move while threads wait.
//!
//! Thread control blocks point at locks (`blocked_on_lock`, `held_locks`)
//! by raw pointer. Those pointers are only followed while the lock provably
//! exists: a lock with a holder or waiters must not be moved or dropped —
//! doing so is a usage bug, exactly like destroying it mid-use.

use core::ptr::NonNull;

use mspin::{IrqSave, SpinRaw};

use crate::api::current_name;
use crate::sched::sched;
use crate::semaphore::Semaphore;
use crate::task::{ThreadRef, ThreadTable};

#[cfg(feature = "stats")]
#[derive(Debug, Default, Clone, Copy)]
/// Contention counters (available with the `stats` feature).
pub struct LockStats {
    /// Successful acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that found the lock held.
    pub contended: u64,
}

/// Mutual exclusion with priority donation. Not recursive: acquiring a lock
/// already held by the caller is a fatal error.
pub struct Lock {
    holder: SpinRaw<Option<ThreadRef>>,
    sema: Semaphore,
    #[cfg(feature = "stats")]
    stats: SpinRaw<LockStats>,
}

impl Lock {
    /// Create an unheld lock.
    pub const fn new() -> Self {
        Self {
            holder: SpinRaw::new(None),
            sema: Semaphore::new(1),
            #[cfg(feature = "stats")]
            stats: SpinRaw::new(LockStats {
                acquisitions: 0,
                contended: 0,
            }),
        }
    }

    /// Acquire the lock, sleeping until it is available.
    ///
    /// Blocks, so it must not be called from interrupt context.
    pub fn acquire(&self) {
        assert!(!mhal::irq::in_irq(), "lock acquire in interrupt context");
        assert!(
            mhal::context::on_kernel_thread(),
            "lock acquire from outside the kernel"
        );
        assert!(
            !self.held_by_current_thread(),
            "{} tried to acquire a lock it already holds",
            current_name()
        );
        {
            let _irq = IrqSave::new();
            #[cfg(feature = "stats")]
            {
                self.stats.lock().acquisitions += 1;
            }
            let holder = *self.holder.lock();
            if let Some(holder) = holder {
                #[cfg(feature = "stats")]
                {
                    self.stats.lock().contended += 1;
                }
                let mut guard = sched().lock();
                let s = &mut *guard;
                let cur = s.current;
                s.table.get_mut(cur).blocked_on_lock = Some(LockPtr::new(self));
                let donor = s.table.get(cur).effective_priority;
                s.donate_chain(donor, holder);
            }
        }
        self.sema.down();
        {
            let _irq = IrqSave::new();
            let mut guard = sched().lock();
            let s = &mut *guard;
            let cur = s.current;
            s.table.get_mut(cur).blocked_on_lock = None;
            *self.holder.lock() = Some(cur);
            if s.table.get_mut(cur).held_locks.push(LockPtr::new(self)).is_err() {
                panic!(
                    "{} holds more than {} locks",
                    s.table.get(cur).name,
                    mcfg::MAX_HELD_LOCKS
                );
            }
        }
    }

    /// Acquire the lock only if it is free right now. No donation happens
    /// on failure — there was nobody to donate to when we looked.
    ///
    /// Does not sleep, so it may be called from interrupt context.
    pub fn try_acquire(&self) -> bool {
        assert!(
            mhal::context::on_kernel_thread(),
            "lock try-acquire from outside the kernel"
        );
        assert!(
            !self.held_by_current_thread(),
            "{} tried to re-acquire a lock it already holds",
            current_name()
        );
        if !self.sema.try_down() {
            return false;
        }
        let _irq = IrqSave::new();
        let mut guard = sched().lock();
        let s = &mut *guard;
        let cur = s.current;
        *self.holder.lock() = Some(cur);
        if s.table.get_mut(cur).held_locks.push(LockPtr::new(self)).is_err() {
            panic!(
                "{} holds more than {} locks",
                s.table.get(cur).name,
                mcfg::MAX_HELD_LOCKS
            );
        }
        true
    }

    /// Release the lock, waking its most urgent waiter. The caller must be
    /// the holder.
    pub fn release(&self) {
        assert!(
            self.held_by_current_thread(),
            "{} tried to release a lock it does not hold",
            current_name()
        );
        // One critical section end to end, so "holder is null but the
        // semaphore still reads zero" is never observable.
        let _irq = IrqSave::new();
        {
            let mut guard = sched().lock();
            let s = &mut *guard;
            let cur = s.current;
            let me = LockPtr::new(self);
            let held = &mut s.table.get_mut(cur).held_locks;
            let pos = held
                .iter()
                .position(|p| *p == me)
                .expect("held lock missing from the holder's list");
            held.swap_remove(pos);
            s.recompute_effective(cur);
            *self.holder.lock() = None;
        }
        self.sema.up();
    }

    /// Whether the calling thread holds this lock. Asking about some other
    /// thread's ownership would be racy, so that is not offered. Outside
    /// the kernel there is no calling thread, so the answer is no.
    pub fn held_by_current_thread(&self) -> bool {
        if !mhal::context::on_kernel_thread() {
            return false;
        }
        let _irq = IrqSave::new();
        let cur = sched().lock().current;
        *self.holder.lock() == Some(cur)
    }

    /// Whether anybody holds the lock right now. Advisory: the answer can
    /// be stale by the time the caller acts on it.
    pub fn is_held(&self) -> bool {
        let _irq = IrqSave::new();
        self.holder.lock().is_some()
    }

    /// Contention counters (available with the `stats` feature).
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> LockStats {
        let _irq = IrqSave::new();
        *self.stats.lock()
    }

    pub(crate) fn holder_ref(&self) -> Option<ThreadRef> {
        *self.holder.lock()
    }

    pub(crate) fn waiters_max_priority(&self, table: &ThreadTable) -> Option<u8> {
        self.sema.max_waiter_priority(table)
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw pointer to a lock, stored in thread control blocks.
///
/// Sendable because it is only ever dereferenced with interrupts disabled,
/// and only while the lock is pinned by having a holder or waiters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockPtr(NonNull<Lock>);

unsafe impl Send for LockPtr {}

impl LockPtr {
    pub fn new(lock: &Lock) -> Self {
        Self(NonNull::from(lock))
    }

    /// # Safety
    ///
    /// The lock must still be alive; guaranteed while some thread is
    /// blocked on it.
    pub unsafe fn holder(&self) -> Option<ThreadRef> {
        unsafe { self.0.as_ref() }.holder_ref()
    }

    /// # Safety
    ///
    /// The lock must still be alive; guaranteed while the recomputing
    /// thread holds it.
    pub unsafe fn max_waiter_priority(&self, table: &ThreadTable) -> Option<u8> {
        unsafe { self.0.as_ref() }.waiters_max_priority(table)
    }
}
