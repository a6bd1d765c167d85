// SPDX-License-Identifier: Apache-2.0

//! Compile-time configuration for the Minos kernel core.
//!
//! Every knob is a `pub const` so the rest of the kernel can use the values in
//! const contexts (array sizes, bitmap widths). Out-of-range values are caught
//! at compile time by the assertions at the bottom of this file.

#![no_std]

/// Timer interrupt frequency in Hz.
///
/// The 8254 PIT cannot divide its input clock down below 19 Hz, and above
/// 1000 Hz the tick overhead starts to dominate.
pub const TICK_HZ: u64 = 100;

/// Lowest thread priority.
pub const PRI_MIN: u8 = 0;

/// Priority assigned to threads that do not ask for one.
pub const PRI_DEFAULT: u8 = 31;

/// Highest thread priority.
pub const PRI_MAX: u8 = 63;

/// Number of distinct priority levels.
pub const PRI_LEVELS: usize = PRI_MAX as usize + 1;

/// Scheduling quantum, in ticks. A thread that runs this long without
/// blocking is preempted at the next interrupt return.
pub const TIME_SLICE: u32 = 4;

/// Upper bound on the priority-donation chain walk. Deeper chains stop
/// donating rather than walking further.
pub const DONATION_DEPTH_MAX: usize = 8;

/// Capacity of the thread table.
pub const MAX_THREADS: usize = 64;

/// Maximum length of a thread name, in bytes. Longer names are truncated.
pub const THREAD_NAME_LEN: usize = 15;

/// Maximum number of locks a single thread may hold at once.
pub const MAX_HELD_LOCKS: usize = 16;

const _: () = assert!(TICK_HZ >= 19, "8254 timer requires TICK_HZ >= 19");
const _: () = assert!(TICK_HZ <= 1000, "TICK_HZ <= 1000 required");
const _: () = assert!(PRI_MIN < PRI_DEFAULT && PRI_DEFAULT < PRI_MAX);
const _: () = assert!(PRI_LEVELS <= 64, "ready-queue bitmap is a u64");
const _: () = assert!(TIME_SLICE >= 1);
const _: () = assert!(MAX_THREADS <= u16::MAX as usize);
