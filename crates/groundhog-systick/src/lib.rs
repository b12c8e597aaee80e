#![cfg_attr(not(test), no_std)]

use groundhog::RollingTimer;
use embedded_hal::blocking::delay::DelayMs;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use cortex_m::peripheral::{syst::SystClkSource, SYST};

/// Ticks per second produced by the SysTick configuration in [`GlobalRollingTimer::init`].
pub const TICK_HZ: u32 = 1_000;

static TICKS: AtomicU32 = AtomicU32::new(0);
static RUNNING: AtomicBool = AtomicBool::new(false);

/// A millisecond rolling timer, advanced by the SysTick exception.
///
/// The counter is written only from [`GlobalRollingTimer::tick`], which must be
/// called from the `SysTick` exception handler. Every other context only reads it.
pub struct GlobalRollingTimer;

impl GlobalRollingTimer {
    pub const fn new() -> Self {
        Self
    }

    /// Configure SysTick to fire at [`TICK_HZ`] from the core clock.
    pub fn init(syst: &mut SYST, core_clock_hz: u32) {
        syst.disable_counter();
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload((core_clock_hz / TICK_HZ) - 1);
        syst.clear_current();

        TICKS.store(0, Ordering::SeqCst);
        let was_running = RUNNING.swap(true, Ordering::SeqCst);
        debug_assert!(!was_running);

        syst.enable_counter();
        syst.enable_interrupt();
    }

    /// Stop the counter and its exception, leaving SysTick as it was at reset.
    pub fn deinit(syst: &mut SYST) {
        syst.disable_interrupt();
        syst.disable_counter();
        syst.clear_current();
        RUNNING.store(false, Ordering::SeqCst);
    }

    /// Advance the counter by one tick. Call this from the `SysTick` handler only.
    #[inline(always)]
    pub fn tick() {
        // NOTE(no-CAS) thumbv6m has no atomic read-modify-write, but this is the
        // only writer and exceptions do not preempt themselves.
        let n = TICKS.load(Ordering::Relaxed);
        TICKS.store(n.wrapping_add(1), Ordering::Release);
    }
}

impl Default for GlobalRollingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingTimer for GlobalRollingTimer {
    type Tick = u32;
    const TICKS_PER_SECOND: u32 = TICK_HZ;

    fn get_ticks(&self) -> u32 {
        // A single aligned word load, so a tick landing mid-read is never torn.
        TICKS.load(Ordering::Acquire)
    }
}

impl DelayMs<u32> for GlobalRollingTimer {
    fn delay_ms(&mut self, ms: u32) {
        if !RUNNING.load(Ordering::Acquire) {
            return;
        }
        let start = self.get_ticks();
        while self.get_ticks().wrapping_sub(start) < ms { }
    }
}
