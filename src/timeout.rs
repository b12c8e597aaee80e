use groundhog::RollingTimer;

/// Elapsed-time check on top of a free running tick counter.
///
/// Nothing here blocks: the owner polls [`Timeout::has_elapsed`] once per
/// loop iteration. A one-shot timeout keeps reporting `true` until it is
/// [`reset`](Timeout::reset). A periodic one re-arms itself each time it
/// fires, keeping its phase so that drift does not accumulate.
pub struct Timeout<T>
where
    T: RollingTimer<Tick = u32>,
{
    timer: T,
    start: u32,
    duration: u32,
    periodic: bool,
}

impl<T> Timeout<T>
where
    T: RollingTimer<Tick = u32>,
{
    /// Create a timeout, armed from now.
    pub fn new(timer: T, duration: u32, periodic: bool) -> Self {
        let start = timer.get_ticks();
        Self {
            timer,
            start,
            duration,
            periodic,
        }
    }

    pub fn arm(&mut self, duration: u32, periodic: bool) {
        self.duration = duration;
        self.periodic = periodic;
        self.reset();
    }

    /// Restart the current budget from now.
    pub fn reset(&mut self) {
        self.start = self.timer.get_ticks();
    }

    pub fn elapsed(&self) -> u32 {
        self.timer.get_ticks().wrapping_sub(self.start)
    }

    pub fn has_elapsed(&mut self) -> bool {
        let elapsed = self.elapsed();

        if elapsed < self.duration {
            return false;
        }

        if self.periodic {
            // Step by whole periods so a late poll doesn't shift the phase
            let periods = elapsed / self.duration.max(1);
            self.start = self
                .start
                .wrapping_add(periods.wrapping_mul(self.duration));
        }

        true
    }
}
