//! RAII guards for interrupt-disabled critical sections.

/// Low-level interrupt control, supplied by the platform layer.
#[crate_interface::def_interface]
pub trait KernelGuardIf {
    /// Save the local interrupt state and disable interrupts, returning the
    /// saved state.
    fn local_irq_save_and_disable() -> usize;

    /// Restore the local interrupt state from saved flags.
    fn local_irq_restore(flags: usize);
}

/// Base trait for all guard types.
///
/// Guards use RAII to delimit critical sections: `acquire` on entry,
/// `release` on exit.
pub trait BaseGuard {
    /// State saved on entry and needed to leave the critical section.
    type State: Clone + Copy;

    /// Enter the critical section, returning the saved state.
    fn acquire() -> Self::State;

    /// Leave the critical section, restoring the saved state.
    fn release(state: Self::State);
}

/// No-op guard. The caller is responsible for already being in a
/// sufficiently protected context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl BaseGuard for NoOp {
    type State = ();

    #[inline(always)]
    fn acquire() -> Self::State {}

    #[inline(always)]
    fn release(_state: Self::State) {}
}

impl NoOp {
    /// Create a new no-op guard.
    #[inline(always)]
    pub const fn new() -> Self {
        Self
    }
}

/// Guard that saves and disables local interrupts, restoring them on drop.
///
/// Nesting is fine: inner guards observe interrupts already off and restore
/// to that state, so only the outermost guard re-enables.
#[derive(Debug)]
pub struct IrqSave(usize);

impl BaseGuard for IrqSave {
    type State = usize;

    #[inline]
    fn acquire() -> Self::State {
        crate_interface::call_interface!(KernelGuardIf::local_irq_save_and_disable)
    }

    #[inline]
    fn release(state: Self::State) {
        crate_interface::call_interface!(KernelGuardIf::local_irq_restore, state);
    }
}

impl IrqSave {
    /// Create a new guard, entering the critical section.
    #[inline]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(<Self as BaseGuard>::acquire())
    }
}

impl Drop for IrqSave {
    #[inline]
    fn drop(&mut self) {
        <Self as BaseGuard>::release(self.0)
    }
}
