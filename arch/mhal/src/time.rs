//! Tick source and short delays.

use crate::port;

/// Program the periodic tick at [`mcfg::TICK_HZ`] and start delivering timer
/// interrupts to the registered tick handler.
///
/// Called once at boot, after the handler is registered.
pub fn start_tick() {
    port::start_tick()
}

/// Spin for `loops` iterations.
///
/// Used to implement sub-tick delays once the loop has been calibrated
/// against the tick. Never inlined: code alignment affects the timing, and
/// the calibration is only meaningful if every caller runs the same code.
#[inline(never)]
pub fn busy_spin(loops: u64) {
    for _ in 0..loops {
        core::hint::spin_loop();
    }
}
