//! Thread context creation and switching.
//!
//! A [`ThreadContext`] is an opaque, cheaply clonable handle to one thread's
//! execution state (on the hosted port, an OS thread parked between runs; on
//! bare metal, whatever the embedding kernel's context-switch layer hands
//! out). The scheduler stores one per thread and calls [`switch`] with
//! interrupts disabled; the switched-out thread resumes inside its own
//! `switch` call when it is next chosen.

use alloc::boxed::Box;

use crate::port;

pub use crate::port::ThreadContext;

#[cfg(all(not(feature = "port-std"), target_arch = "x86_64", target_os = "none"))]
pub use crate::port_x86::ContextSwitchIf;

/// Create a context that will run `entry` the first time it is switched to.
///
/// The new context starts with interrupts masked, holding one level of
/// critical section; `entry` is expected to leave it with
/// [`crate::irq::enable`] once its bookkeeping is done, and to never return.
pub fn new_context(entry: Box<dyn FnOnce() + Send + 'static>) -> ThreadContext {
    port::new_context(entry)
}

/// Switch from `prev` (the caller's context) to `next`.
///
/// Must be called with interrupts disabled. Returns when `prev` is next
/// scheduled, again with interrupts disabled.
pub fn switch(prev: &ThreadContext, next: &ThreadContext) {
    port::switch(prev, next)
}

/// Switch to `next` and never come back; the caller's context is dead.
///
/// Must be called with interrupts disabled.
pub fn switch_and_exit(next: &ThreadContext) -> ! {
    port::switch_and_exit(next)
}

/// Hand the boot-time critical section to `first` and start running it.
///
/// Called exactly once, by scheduler initialization.
pub fn start(first: &ThreadContext) {
    port::start(first)
}

/// Whether the calling thread is a kernel thread (one created through
/// [`new_context`]), as opposed to an outside host thread poking at the
/// kernel from the test harness.
///
/// On bare metal every caller is a kernel thread.
pub fn on_kernel_thread() -> bool {
    port::on_kernel_thread()
}
