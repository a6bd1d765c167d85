// SPDX-License-Identifier: Apache-2.0

//! Platform layer for the Minos kernel core.
//!
//! The concurrency core consumes a small hardware contract: mask and unmask
//! local interrupts, learn whether it is running in interrupt context, ask
//! for a deferred yield at interrupt return, switch thread contexts, and
//! program a periodic tick. This crate is where that contract is met.
//!
//! Two ports are provided:
//!
//! - **`port-std`** (cargo feature, on by default): a hosted port that runs
//!   every kernel thread on an OS thread and simulates the single CPU — one
//!   interrupt flag, one running thread, pending timer interrupts delivered
//!   when the running thread re-enables interrupts. This is what the test
//!   suite runs on.
//! - **bare x86-64** (`target_os = "none"`, default features off): RFLAGS
//!   based interrupt masking and the 8254 PIT as the tick source. Context
//!   switching and interrupt dispatch belong to the embedding kernel's
//!   architecture layer and are reached through the `ContextSwitchIf`
//!   interface and the handler hooks in [`irq`].

#![cfg_attr(not(any(test, feature = "port-std")), no_std)]

extern crate alloc;

#[cfg(all(
    not(feature = "port-std"),
    not(all(target_arch = "x86_64", target_os = "none"))
))]
compile_error!(
    "no platform port for this target; enable the `port-std` feature or build for bare x86-64"
);

pub mod context;
pub mod irq;
pub mod time;

#[cfg(feature = "port-std")]
mod port_std;
#[cfg(feature = "port-std")]
pub(crate) use port_std as port;

#[cfg(all(not(feature = "port-std"), target_arch = "x86_64", target_os = "none"))]
mod port_x86;
#[cfg(all(not(feature = "port-std"), target_arch = "x86_64", target_os = "none"))]
pub(crate) use port_x86 as port;
