// SPDX-License-Identifier: Apache-2.0

//! The Minos concurrency core: a preemptive priority scheduler and the
//! synchronization primitives built on it.
//!
//! - Threads with 64 priority levels, FIFO among equals, preempted when a
//!   more urgent thread becomes ready or their quantum runs out.
//! - A tick-driven sleep queue ([`timers`]).
//! - Counting [`Semaphore`]s with priority-ordered wakeup.
//! - Non-recursive [`Lock`]s with transitive priority donation.
//! - Mesa-style [`Condvar`]s that signal the most urgent waiter first.
//!
//! Scheduler-touching state is protected by disabling interrupts around
//! each critical section; on the single CPU this crate assumes, that is the
//! strongest primitive there is, and it composes with interrupt-context
//! callers like the tick handler.
//!
//! # Examples
//!
//! ```no_run
//! use mkern::Lock;
//!
//! static LOCK: Lock = Lock::new();
//!
//! fn worker() {
//!     LOCK.acquire();
//!     // ... the critical section runs at our priority, or higher if a
//!     // more urgent thread starts waiting for LOCK ...
//!     LOCK.release();
//! }
//!
//! fn main() {
//!     mkern::init_scheduler();
//!     let worker = mkern::spawn("worker", 40, worker).unwrap();
//!     worker.join();
//! }
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

extern crate alloc;

mod api;
mod condvar;
mod list;
mod lock;
mod run_queue;
mod sched;
mod semaphore;
mod task;
pub mod timers;
mod wait_queue;

#[cfg(feature = "stats")]
pub use self::lock::LockStats;
pub use self::{
    api::{
        base_priority, current, current_name, exit, init_scheduler, priority, set_priority,
        spawn, stats, JoinHandle, KernelStats,
    },
    condvar::Condvar,
    lock::Lock,
    sched::{should_preempt, yield_now},
    semaphore::Semaphore,
    task::{SpawnError, ThreadRef, Tid},
    timers::on_timer_tick,
};
