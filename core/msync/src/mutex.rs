//! A [`lock_api::RawMutex`] over the kernel's priority-donating lock.

/// Raw mutex backed by [`mkern::Lock`], so every guard carries the kernel's
/// donation behavior: while a more urgent thread waits for the mutex, the
/// holder runs at the waiter's priority.
pub struct RawKernelMutex {
    lock: mkern::Lock,
}

impl RawKernelMutex {
    pub(crate) fn kernel_lock(&self) -> &mkern::Lock {
        &self.lock
    }
}

unsafe impl lock_api::RawMutex for RawKernelMutex {
    type GuardMarker = lock_api::GuardSend;

    /// Initial value for an unlocked mutex.
    ///
    /// A “non-constant” const item is a legacy way to supply an initialized
    /// value to downstream static items.
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawKernelMutex {
        lock: mkern::Lock::new(),
    };

    #[inline]
    fn lock(&self) {
        self.lock.acquire();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.lock.try_acquire()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.lock.release();
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.lock.is_held()
    }
}

/// An alias of [`lock_api::Mutex`].
pub type Mutex<T> = lock_api::Mutex<RawKernelMutex, T>;
/// An alias of [`lock_api::MutexGuard`].
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawKernelMutex, T>;
