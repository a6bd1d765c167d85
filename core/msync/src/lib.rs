// SPDX-License-Identifier: Apache-2.0

//! RAII synchronization primitives for kernel code.
//!
//! The raw primitives in [`mkern`] follow the classic explicit style:
//! `acquire`/`release`, `down`/`up`. This crate wraps them the way Rust
//! code wants to consume them:
//!
//! - [`Mutex`]: a `lock_api` mutex over the kernel's priority-donating
//!   lock, so guards release on drop and the data lives inside the lock.
//! - [`Semaphore`]: permit-style counting semaphore with an RAII
//!   [`SemaphoreGuard`].
//! - [`Condvar`]: condition variable whose `wait` consumes and returns the
//!   mutex guard.
//! - [`spin`]: re-export of `mspin` for interrupt-disabling spinlocks.
//!
//! # Examples
//!
//! ## Mutex
//! ```no_run
//! use msync::Mutex;
//!
//! static DATA: Mutex<u32> = Mutex::new(0);
//!
//! fn task() {
//!     let mut data = DATA.lock();
//!     *data += 1;
//! } // released (and donations re-evaluated) on drop
//! ```
//!
//! ## Semaphore
//! ```no_run
//! use msync::Semaphore;
//!
//! static SLOTS: Semaphore = Semaphore::new(3);
//!
//! fn task() {
//!     let _permit = SLOTS.acquire_guard();
//!     // at most three tasks in here at once
//! }
//! ```
//!
//! ## Condvar
//! ```no_run
//! use msync::{Condvar, Mutex};
//!
//! static READY: Mutex<bool> = Mutex::new(false);
//! static COND: Condvar = Condvar::new();
//!
//! fn consumer() {
//!     let mut ready = READY.lock();
//!     while !*ready {
//!         ready = COND.wait(ready); // Mesa-style: recheck in a loop
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub use mspin as spin;

mod condvar;
mod mutex;
mod semaphore;

pub use self::{
    condvar::Condvar,
    mutex::{Mutex, MutexGuard, RawKernelMutex},
    semaphore::{Semaphore, SemaphoreGuard},
};
