//! Bare x86-64 port: RFLAGS-based interrupt masking and the 8254 PIT as the
//! tick source.
//!
//! Interrupt dispatch and the low-level context switch belong to the
//! embedding kernel's architecture layer. The dispatcher routes the timer
//! vector to [`timer_interrupt_entry`]; context operations are supplied by
//! implementing [`ContextSwitchIf`].

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::{interrupts, port::Port};

static IN_IRQ: AtomicBool = AtomicBool::new(false);
static YIELD_REQUESTED: AtomicBool = AtomicBool::new(false);

pub(crate) fn irq_save_and_disable() -> usize {
    let was_on = interrupts::are_enabled();
    interrupts::disable();
    was_on as usize
}

pub(crate) fn irq_restore(flags: usize) {
    if flags != 0 {
        interrupts::enable();
    }
}

pub(crate) fn irq_enable() {
    assert!(!in_irq(), "interrupts enabled inside an interrupt handler");
    interrupts::enable();
}

pub(crate) fn irqs_enabled() -> bool {
    interrupts::are_enabled()
}

pub(crate) fn in_irq() -> bool {
    IN_IRQ.load(Ordering::Relaxed)
}

pub(crate) fn request_yield_on_return() {
    assert!(
        in_irq(),
        "deferred yield requested outside interrupt context"
    );
    YIELD_REQUESTED.store(true, Ordering::Relaxed);
}

pub(crate) fn wait_for_irq() {
    interrupts::enable_and_hlt();
}

/// Timer interrupt entry, called by the interrupt dispatcher with interrupts
/// masked. Runs the tick handler and, on the way out, any yield a handler
/// deferred to interrupt return.
pub fn timer_interrupt_entry() {
    IN_IRQ.store(true, Ordering::Relaxed);
    crate::irq::dispatch_tick();
    IN_IRQ.store(false, Ordering::Relaxed);
    if YIELD_REQUESTED.swap(false, Ordering::Relaxed) {
        crate::irq::run_deferred_yield();
    }
}

pub(crate) fn start_tick() {
    // 8254 input frequency divided down to TICK_HZ, rounded to nearest.
    let divisor = ((1_193_180 + mcfg::TICK_HZ / 2) / mcfg::TICK_HZ) as u16;
    let mut control: Port<u8> = Port::new(0x43);
    let mut counter0: Port<u8> = Port::new(0x40);
    unsafe {
        control.write(0x34u8); // counter 0, LSB then MSB, mode 2, binary
        counter0.write((divisor & 0xff) as u8);
        counter0.write((divisor >> 8) as u8);
    }
    log::debug!("8254 PIT programmed for {} Hz", mcfg::TICK_HZ);
}

/// Low-level context operations, supplied by the embedding kernel.
#[crate_interface::def_interface]
pub trait ContextSwitchIf {
    /// Allocate a kernel stack and a context that runs `entry` when first
    /// switched to, returning an opaque handle.
    fn new_context(entry: Box<dyn FnOnce() + Send + 'static>) -> usize;

    /// Swap callee-saved state from `prev` to `next`.
    fn switch(prev: usize, next: usize);

    /// Switch to `next`; `prev`'s stack may be reclaimed afterwards.
    fn switch_and_exit(next: usize);

    /// Begin running `first`; called once at boot.
    fn start(first: usize);
}

/// Handle to one thread's execution state.
#[derive(Clone)]
pub struct ThreadContext(usize);

pub(crate) fn new_context(entry: Box<dyn FnOnce() + Send + 'static>) -> ThreadContext {
    ThreadContext(crate_interface::call_interface!(
        ContextSwitchIf::new_context,
        entry
    ))
}

pub(crate) fn switch(prev: &ThreadContext, next: &ThreadContext) {
    crate_interface::call_interface!(ContextSwitchIf::switch, prev.0, next.0)
}

pub(crate) fn switch_and_exit(next: &ThreadContext) -> ! {
    crate_interface::call_interface!(ContextSwitchIf::switch_and_exit, next.0);
    unreachable!("dead context resumed")
}

pub(crate) fn start(first: &ThreadContext) {
    crate_interface::call_interface!(ContextSwitchIf::start, first.0)
}

pub(crate) fn on_kernel_thread() -> bool {
    true
}
