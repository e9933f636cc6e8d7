//! Local and global clocks
//!
//! - [`LocalClock`]: one per worker thread, refreshed around every blocking
//!   wait, never decreases.
//! - [`GlobalClock`]: one per process, advanced by whichever thread is
//!   furthest ahead, never decreases.

use std::time::Duration;

use stratus_core::{AtomicPackedClock, PackedClock};
use tracing::{debug, warn};

use crate::ClockSource;

/// A clock source misbehaved during a refresh
///
/// Anomalies only degrade precision. The refresh still produces a
/// monotonic date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockAnomaly {
    /// The monotonic source returned nothing
    MonotonicUnavailable,
    /// The monotonic source went backward by `by`
    MonotonicRegressed { by: Duration },
    /// The wall source returned nothing
    WallUnavailable,
    /// The wall date fell outside the window expected after the poll
    WallJump,
}

impl ClockAnomaly {
    fn same_kind(&self, other: &ClockAnomaly) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Per-thread cached clock
///
/// INVARIANT: `monotonic_now` never decreases.
#[derive(Clone, Debug)]
pub struct LocalClock {
    /// Internal monotonic date
    monotonic_now: PackedClock,
    /// Last wall-clock date read
    wall_now: PackedClock,
    /// Raw monotonic reading taken at the previous refresh
    last_mono: Option<PackedClock>,
    /// Wall date taken when the thread was about to block
    before_poll: Option<PackedClock>,
    /// Tolerance above the announced wait before a wall date is a jump
    max_forward_jump: Duration,
    anomalies: u64,
    last_anomaly: Option<ClockAnomaly>,
}

impl LocalClock {
    /// Start at `monotonic` with `wall` as the last known date
    pub fn new(monotonic: PackedClock, wall: PackedClock, max_forward_jump: Duration) -> Self {
        LocalClock {
            monotonic_now: monotonic,
            wall_now: wall,
            last_mono: None,
            before_poll: None,
            max_forward_jump,
            anomalies: 0,
            last_anomaly: None,
        }
    }

    #[inline]
    pub fn monotonic_now(&self) -> PackedClock {
        self.monotonic_now
    }

    #[inline]
    pub fn wall_now(&self) -> PackedClock {
        self.wall_now
    }

    /// Number of refreshes that observed an anomaly
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Anomaly seen by the most recent refresh, if any
    pub fn last_anomaly(&self) -> Option<ClockAnomaly> {
        self.last_anomaly
    }

    /// Remember the wall date at which the thread is about to block.
    /// The next refresh validates wall dates against it.
    pub fn set_poll_anchor(&mut self, wall: PackedClock) {
        self.before_poll = Some(wall);
    }

    /// Raise the monotonic date to `floor` if it is behind
    #[inline]
    pub fn catch_up(&mut self, floor: PackedClock) {
        if self.monotonic_now < floor {
            self.monotonic_now = floor;
        }
    }

    /// Refresh both dates from `source`.
    ///
    /// `max_wait` is how long the thread said it would block, `interrupted`
    /// tells whether the wait was cut short. Both only matter when the
    /// monotonic source cannot be trusted and the elapsed time has to be
    /// derived from the wall clock.
    pub fn refresh(
        &mut self,
        source: &dyn ClockSource,
        max_wait: Duration,
        interrupted: bool,
    ) -> Option<ClockAnomaly> {
        let prev_wall = self.wall_now;
        let wall = source.wall();
        let mono = source.monotonic();
        let mut anomaly = None;

        let from_mono = match (mono, self.last_mono) {
            (Some(m), Some(last)) if m >= last => Some(m - last),
            (Some(m), Some(last)) => {
                anomaly = Some(ClockAnomaly::MonotonicRegressed { by: last - m });
                None
            }
            // first reading: nothing to difference against yet
            (Some(_), None) => None,
            (None, _) => {
                anomaly = Some(ClockAnomaly::MonotonicUnavailable);
                None
            }
        };

        let elapsed = match from_mono {
            Some(elapsed) => elapsed,
            None => self.wall_elapsed(prev_wall, wall, max_wait, interrupted, &mut anomaly),
        };

        self.monotonic_now = self.monotonic_now.saturating_add(elapsed);
        self.wall_now = match wall {
            Some(w) => w,
            None => {
                anomaly.get_or_insert(ClockAnomaly::WallUnavailable);
                prev_wall.saturating_add(elapsed)
            }
        };
        if mono.is_some() {
            self.last_mono = mono;
        }
        self.before_poll = None;

        self.record(anomaly);
        anomaly
    }

    /// Elapsed time derived from the wall clock.
    ///
    /// The new date must lie in `[anchor + max_wait, anchor + max_wait +
    /// max_forward_jump]` (lower bound waived when interrupted). Outside of
    /// it the date is ignored and the thread is assumed to have waited
    /// exactly `max_wait`, or nothing if interrupted.
    fn wall_elapsed(
        &self,
        prev_wall: PackedClock,
        wall: Option<PackedClock>,
        max_wait: Duration,
        interrupted: bool,
        anomaly: &mut Option<ClockAnomaly>,
    ) -> Duration {
        let assumed = if interrupted { Duration::ZERO } else { max_wait };
        let Some(date) = wall else {
            return assumed;
        };

        let anchor = self.before_poll.unwrap_or(prev_wall);
        let min_deadline = anchor.saturating_add(max_wait);
        let max_deadline = min_deadline.saturating_add(self.max_forward_jump);

        if date < anchor || (!interrupted && date < min_deadline) || date > max_deadline {
            anomaly.get_or_insert(ClockAnomaly::WallJump);
            assumed
        } else {
            date - prev_wall
        }
    }

    fn record(&mut self, anomaly: Option<ClockAnomaly>) {
        if let Some(a) = anomaly {
            self.anomalies += 1;
            let new_kind = self.last_anomaly.map_or(true, |last| !last.same_kind(&a));
            if new_kind {
                warn!(anomaly = ?a, now = %self.monotonic_now, "clock source anomaly");
            } else {
                debug!(anomaly = ?a, count = self.anomalies, "clock source anomaly persists");
            }
        } else if let Some(last) = self.last_anomaly {
            debug!(previous = ?last, "clock source recovered");
        }
        self.last_anomaly = anomaly;
    }
}

/// Process-wide date shared by all threads
///
/// INVARIANT: never decreases.
#[derive(Debug, Default)]
pub struct GlobalClock {
    now: AtomicPackedClock,
}

impl GlobalClock {
    pub fn new(start: PackedClock) -> Self {
        GlobalClock {
            now: AtomicPackedClock::new(start),
        }
    }

    /// Current global date
    #[inline]
    pub fn now(&self) -> PackedClock {
        self.now.load()
    }

    /// Publish `local` into the global date.
    ///
    /// A local clock lagging behind the global date first catches up with
    /// it, then the global date is advanced to the local one. On return both
    /// hold the same value, which is returned.
    pub fn publish(&self, local: &mut LocalClock) -> PackedClock {
        local.catch_up(self.now.load());
        let published = self.now.fetch_advance(local.monotonic_now());
        local.catch_up(published);
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClockSource;
    use proptest::prelude::*;
    use std::sync::Arc;

    const JUMP: Duration = Duration::from_millis(100);

    fn setup() -> (ManualClockSource, LocalClock) {
        let src = ManualClockSource::new(PackedClock::new(1000, 0), PackedClock::new(50, 0));
        let mut local = LocalClock::new(PackedClock::new(1000, 0), PackedClock::new(1000, 0), JUMP);
        // prime the monotonic baseline
        local.refresh(&src, Duration::ZERO, true);
        (src, local)
    }

    #[test]
    fn test_refresh_follows_monotonic() {
        let (src, mut local) = setup();
        let before = local.monotonic_now();

        src.advance(Duration::from_millis(25));
        assert_eq!(local.refresh(&src, Duration::from_millis(25), false), None);
        assert_eq!(local.monotonic_now() - before, Duration::from_millis(25));
        assert_eq!(local.wall_now(), src.peek_wall());
    }

    #[test]
    fn test_monotonic_regression_detected() {
        let (src, mut local) = setup();
        let before = local.monotonic_now();

        src.set_monotonic(PackedClock::new(49, 0));
        src.advance_wall(Duration::from_millis(10));
        let anomaly = local.refresh(&src, Duration::from_millis(10), false);

        assert_eq!(
            anomaly,
            Some(ClockAnomaly::MonotonicRegressed { by: Duration::from_secs(1) })
        );
        // fell back to the wall delta
        assert_eq!(local.monotonic_now() - before, Duration::from_millis(10));
        assert_eq!(local.anomalies(), 1);

        // new baseline: next refresh is clean
        src.advance(Duration::from_millis(5));
        assert_eq!(local.refresh(&src, Duration::from_millis(5), false), None);
        assert_eq!(local.last_anomaly(), None);
    }

    #[test]
    fn test_monotonic_unavailable_uses_wall() {
        let (src, mut local) = setup();
        let before = local.monotonic_now();
        src.set_monotonic_available(false);

        local.set_poll_anchor(src.peek_wall());
        src.advance_wall(Duration::from_millis(40));
        let anomaly = local.refresh(&src, Duration::from_millis(40), false);

        assert_eq!(anomaly, Some(ClockAnomaly::MonotonicUnavailable));
        assert_eq!(local.monotonic_now() - before, Duration::from_millis(40));
    }

    #[test]
    fn test_wall_backward_jump_is_clamped() {
        let (src, mut local) = setup();
        src.set_monotonic_available(false);
        let before = local.monotonic_now();

        local.set_poll_anchor(src.peek_wall());
        src.set_wall(PackedClock::new(900, 0));
        local.refresh(&src, Duration::from_millis(20), false);

        // assumed to have waited max_wait
        assert_eq!(local.monotonic_now() - before, Duration::from_millis(20));
        assert_eq!(local.wall_now(), PackedClock::new(900, 0));

        // interrupted: assume no time passed
        src.set_wall(PackedClock::new(800, 0));
        let frozen = local.monotonic_now();
        local.refresh(&src, Duration::from_millis(20), true);
        assert_eq!(local.monotonic_now(), frozen);
    }

    #[test]
    fn test_wall_forward_jump_is_clamped() {
        let (src, mut local) = setup();
        src.set_monotonic_available(false);
        let before = local.monotonic_now();

        local.set_poll_anchor(src.peek_wall());
        src.advance_wall(Duration::from_secs(3600));
        let anomaly = local.refresh(&src, Duration::from_millis(50), false);

        assert_eq!(anomaly, Some(ClockAnomaly::MonotonicUnavailable));
        assert_eq!(local.monotonic_now() - before, Duration::from_millis(50));
    }

    #[test]
    fn test_wall_unavailable_is_extrapolated() {
        let (src, mut local) = setup();
        let wall_before = local.wall_now();
        src.set_wall_available(false);
        src.advance(Duration::from_millis(30));

        let anomaly = local.refresh(&src, Duration::from_millis(30), false);
        assert_eq!(anomaly, Some(ClockAnomaly::WallUnavailable));
        assert_eq!(local.wall_now() - wall_before, Duration::from_millis(30));
    }

    #[test]
    fn test_both_sources_down_still_moves() {
        let (src, mut local) = setup();
        src.set_wall_available(false);
        src.set_monotonic_available(false);
        let before = local.monotonic_now();

        local.refresh(&src, Duration::from_millis(7), false);
        assert_eq!(local.monotonic_now() - before, Duration::from_millis(7));
    }

    #[test]
    fn test_publish_catches_up() {
        let global = GlobalClock::new(PackedClock::new(500, 0));
        let mut behind = LocalClock::new(PackedClock::new(400, 0), PackedClock::ZERO, JUMP);
        assert_eq!(global.publish(&mut behind), PackedClock::new(500, 0));
        assert_eq!(behind.monotonic_now(), PackedClock::new(500, 0));

        let mut ahead = LocalClock::new(PackedClock::new(600, 0), PackedClock::ZERO, JUMP);
        assert_eq!(global.publish(&mut ahead), PackedClock::new(600, 0));
        assert_eq!(global.now(), PackedClock::new(600, 0));
    }

    #[test]
    fn test_concurrent_publish_is_monotonic() {
        let global = Arc::new(GlobalClock::new(PackedClock::ZERO));
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let global = Arc::clone(&global);
                std::thread::spawn(move || {
                    let mut max_seen = PackedClock::ZERO;
                    let mut last_global = PackedClock::ZERO;
                    for i in 0..2000u32 {
                        // scattered, thread-dependent local dates
                        let secs = (i * 7 + t * 13) % 1000;
                        let mut local = LocalClock::new(PackedClock::new(secs, i % 1000), PackedClock::ZERO, JUMP);
                        max_seen = max_seen.max(local.monotonic_now());
                        global.publish(&mut local);
                        let now = global.now();
                        assert!(now >= last_global);
                        assert!(now >= max_seen);
                        last_global = now;
                    }
                    max_seen
                })
            })
            .collect();

        let max_all = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .max()
            .unwrap();
        assert_eq!(global.now(), max_all);
    }

    proptest! {
        #[test]
        fn local_clock_never_decreases(steps in proptest::collection::vec((0i64..2_000_000, -500_000i64..2_000_000, any::<bool>(), any::<bool>()), 1..50)) {
            let (src, mut local) = setup();
            let mut last = local.monotonic_now();
            for (wall_step, mono_step, mono_ok, interrupted) in steps {
                let wall = src.peek_wall().as_micros() as i64 + wall_step;
                let mono = (src.peek_monotonic().as_micros() as i64 + mono_step).max(0);
                src.set_wall(PackedClock::from_micros(wall as u64));
                src.set_monotonic(PackedClock::from_micros(mono as u64));
                src.set_monotonic_available(mono_ok);
                local.refresh(&src, Duration::from_millis(10), interrupted);
                prop_assert!(local.monotonic_now() >= last);
                last = local.monotonic_now();
            }
        }
    }
}
