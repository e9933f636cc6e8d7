//! Idle accounting
//!
//! A worker alternates between running (after_poll → before_poll) and
//! sleeping in the poller (before_poll → date). The idle ratio is the share
//! of sleeping time over a sampling window.

use std::time::Duration;

use stratus_core::PackedClock;

/// Percentage of `idle` over `samp`, rounded to nearest.
///
/// A zero sample yields 0 instead of dividing by zero.
pub fn idle_ratio(idle: Duration, samp: Duration) -> u32 {
    let samp = samp.as_micros();
    if samp == 0 {
        return 0;
    }
    let idle = idle.as_micros().min(samp);
    ((100 * idle + samp / 2) / samp) as u32
}

/// Per-thread idle meter
#[derive(Clone, Debug)]
pub struct IdleMeter {
    before_poll: PackedClock,
    after_poll: PackedClock,
    idle_time: Duration,
    samp_time: Duration,
    busy_time: Duration,
    window: Duration,
}

impl IdleMeter {
    /// `window` is the minimum sample length before a ratio is produced
    pub fn new(now: PackedClock, window: Duration) -> Self {
        IdleMeter {
            before_poll: now,
            after_poll: now,
            idle_time: Duration::ZERO,
            samp_time: Duration::ZERO,
            busy_time: Duration::ZERO,
            window,
        }
    }

    /// The thread is about to block at wall date `date`.
    /// Returns how long it ran since it last woke up.
    pub fn entering_poll(&mut self, date: PackedClock) -> Duration {
        self.before_poll = date;
        let run = date - self.after_poll;
        self.busy_time += run;
        run
    }

    /// The thread woke up at wall date `date`.
    ///
    /// `max_idle` caps the sleep attributed to this wait, so a wall clock
    /// jump cannot be booked as idle time. Returns the new idle percentage
    /// when the sample window is complete.
    pub fn leaving_poll(&mut self, date: PackedClock, max_idle: Option<Duration>) -> Option<u32> {
        let mut slept = date - self.before_poll;
        if let Some(cap) = max_idle {
            slept = slept.min(cap);
        }
        self.idle_time += slept;
        self.samp_time += date - self.after_poll;
        self.after_poll = date;

        if self.samp_time < self.window {
            return None;
        }

        let pct = idle_ratio(self.idle_time, self.samp_time);
        self.idle_time = Duration::ZERO;
        self.samp_time = Duration::ZERO;
        Some(pct)
    }

    /// Total running time observed so far
    pub fn busy_time(&self) -> Duration {
        self.busy_time
    }

    /// Sample accumulated towards the next ratio
    pub fn pending_sample(&self) -> (Duration, Duration) {
        (self.idle_time, self.samp_time)
    }
}
