//! Interrupt management.
//!
//! The scheduler registers two hooks here at boot: the tick handler (run in
//! interrupt context on every timer interrupt) and the deferred-yield hook
//! (run at interrupt return when a handler asked to preempt the interrupted
//! thread). Both ports drive them through [`dispatch_tick`] and
//! [`run_deferred_yield`].

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::port;

#[cfg(all(not(feature = "port-std"), target_arch = "x86_64", target_os = "none"))]
pub use crate::port_x86::timer_interrupt_entry;

static TICK_HANDLER: AtomicUsize = AtomicUsize::new(0);
static DEFERRED_YIELD: AtomicUsize = AtomicUsize::new(0);

/// Register the function called on every timer tick, in interrupt context.
///
/// Can be called only once; subsequent calls return false.
pub fn register_tick_handler(handler: fn()) -> bool {
    TICK_HANDLER
        .compare_exchange(
            0,
            handler as *const () as usize,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
}

/// Register the function called at interrupt return after
/// [`yield_on_return`] was requested.
///
/// Can be called only once; subsequent calls return false.
pub fn register_deferred_yield(handler: fn()) -> bool {
    DEFERRED_YIELD
        .compare_exchange(
            0,
            handler as *const () as usize,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
}

/// Invoke the registered tick handler, if any.
///
/// Called by the active port with interrupts masked and the interrupt
/// context flag raised.
pub(crate) fn dispatch_tick() {
    let handler = TICK_HANDLER.load(Ordering::SeqCst);
    if handler != 0 {
        let handler = unsafe { core::mem::transmute::<usize, fn()>(handler) };
        handler();
    }
}

/// Invoke the registered deferred-yield hook, if any.
pub(crate) fn run_deferred_yield() {
    let handler = DEFERRED_YIELD.load(Ordering::SeqCst);
    if handler != 0 {
        let handler = unsafe { core::mem::transmute::<usize, fn()>(handler) };
        handler();
    }
}

/// Save the local interrupt state and disable interrupts.
#[inline]
pub fn save_disable() -> usize {
    port::irq_save_and_disable()
}

/// Restore the local interrupt state saved by [`save_disable`].
#[inline]
pub fn restore(flags: usize) {
    port::irq_restore(flags)
}

/// Unconditionally enable interrupts.
///
/// # Panics
///
/// Panics if called from interrupt context; handlers run to completion with
/// interrupts masked.
#[inline]
pub fn enable() {
    port::irq_enable()
}

/// Whether local interrupts are currently enabled.
#[inline]
pub fn is_enabled() -> bool {
    port::irqs_enabled()
}

/// Whether the caller is running in interrupt context.
#[inline]
pub fn in_irq() -> bool {
    port::in_irq()
}

/// Ask for the interrupted thread to yield when the current interrupt
/// handler returns.
///
/// # Panics
///
/// Panics if called outside interrupt context; ordinary code yields
/// directly.
#[inline]
pub fn yield_on_return() {
    port::request_yield_on_return()
}

/// Idle until the next interrupt arrives and has been serviced.
#[inline]
pub fn wait_for_irq() {
    port::wait_for_irq()
}

struct GuardIfImpl;

#[crate_interface::impl_interface]
impl mspin::KernelGuardIf for GuardIfImpl {
    fn local_irq_save_and_disable() -> usize {
        save_disable()
    }

    fn local_irq_restore(flags: usize) {
        restore(flags)
    }
}
