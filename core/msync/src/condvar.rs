//! Guard-passing condition variable over [`crate::Mutex`].

use crate::mutex::MutexGuard;

/// A condition variable tied to [`crate::Mutex`] guards. Mesa-style: a
/// woken thread must recheck its predicate, since wakeup and lock
/// re-acquisition are not atomic.
pub struct Condvar {
    inner: mkern::Condvar,
}

impl Condvar {
    /// Create a condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            inner: mkern::Condvar::new(),
        }
    }

    /// Release the guard's mutex, wait to be notified, re-acquire, and
    /// hand back a fresh guard.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = MutexGuard::mutex(&guard);
        // The kernel-side wait releases and re-acquires the lock itself;
        // forget the guard so lock_api does not release it a second time.
        let lock = unsafe { mutex.raw() }.kernel_lock();
        core::mem::forget(guard);
        self.inner.wait(lock);
        // Safety: wait() returned holding the lock again.
        unsafe { mutex.make_guard_unchecked() }
    }

    /// Wake the most urgent waiter. The guard proves the caller holds the
    /// mutex, as the kernel requires.
    pub fn notify_one<T>(&self, guard: &MutexGuard<'_, T>) {
        let mutex = MutexGuard::mutex(guard);
        self.inner.signal(unsafe { mutex.raw() }.kernel_lock());
    }

    /// Wake every waiter.
    pub fn notify_all<T>(&self, guard: &MutexGuard<'_, T>) {
        let mutex = MutexGuard::mutex(guard);
        self.inner.broadcast(unsafe { mutex.raw() }.kernel_lock());
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
