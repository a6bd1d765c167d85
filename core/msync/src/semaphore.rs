//! Permit-style counting semaphore.

/// A counting semaphore. Allows a fixed number of permits to be held at
/// once; a release wakes the most urgent waiter.
pub struct Semaphore(mkern::Semaphore);

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    pub const fn new(permits: usize) -> Self {
        Self(mkern::Semaphore::new(permits))
    }

    /// Acquires a permit, blocking until one is available.
    pub fn acquire(&self) {
        self.0.down();
    }

    /// Tries to acquire a permit without blocking.
    ///
    /// Returns `true` if a permit was acquired, `false` otherwise.
    pub fn try_acquire(&self) -> bool {
        self.0.try_down()
    }

    /// Releases a permit.
    ///
    /// More permits than the semaphore was created with may be released;
    /// callers are responsible for keeping acquires and releases balanced.
    pub fn release(&self) {
        self.0.up();
    }

    /// Returns the current number of available permits.
    pub fn available_permits(&self) -> usize {
        self.0.value()
    }

    /// Acquires a permit and returns a guard that releases it on drop.
    pub fn acquire_guard(&self) -> SemaphoreGuard<'_> {
        self.acquire();
        SemaphoreGuard { sem: self }
    }
}

/// RAII guard for a semaphore permit.
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}
