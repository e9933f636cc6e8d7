//! Clock sources
//!
//! A source answers "what time is it" for the wall clock, the monotonic
//! clock and the CPU clocks. Any reading may be missing; the engine copes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use stratus_core::PackedClock;

/// Where the engine reads time from
pub trait ClockSource: Send + Sync {
    /// Wall-clock date (seconds since the Unix epoch)
    fn wall(&self) -> Option<PackedClock>;

    /// Monotonic ticks, arbitrary origin
    fn monotonic(&self) -> Option<PackedClock>;

    /// CPU time consumed by the whole process, in nanoseconds
    fn process_cpu_ns(&self) -> Option<u64>;

    /// CPU time consumed by the calling thread, in nanoseconds
    fn thread_cpu_ns(&self) -> Option<u64>;
}

/// Kernel clocks
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClockSource;

#[cfg(target_os = "linux")]
mod sys {
    use stratus_core::PackedClock;

    fn gettime(id: libc::clockid_t) -> Option<libc::timespec> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `clock_gettime` only writes through the valid pointer we pass.
        if unsafe { libc::clock_gettime(id, &mut ts) } == 0 {
            Some(ts)
        } else {
            None
        }
    }

    pub fn clock(id: libc::clockid_t) -> Option<PackedClock> {
        let ts = gettime(id)?;
        let secs = u32::try_from(ts.tv_sec).ok()?;
        Some(PackedClock::new(secs, (ts.tv_nsec / 1000) as u32))
    }

    pub fn nanos(id: libc::clockid_t) -> Option<u64> {
        let ts = gettime(id)?;
        Some((ts.tv_sec as u64).saturating_mul(1_000_000_000).saturating_add(ts.tv_nsec as u64))
    }
}

#[cfg(target_os = "linux")]
impl ClockSource for SystemClockSource {
    fn wall(&self) -> Option<PackedClock> {
        sys::clock(libc::CLOCK_REALTIME)
    }

    fn monotonic(&self) -> Option<PackedClock> {
        sys::clock(libc::CLOCK_MONOTONIC)
    }

    fn process_cpu_ns(&self) -> Option<u64> {
        sys::nanos(libc::CLOCK_PROCESS_CPUTIME_ID)
    }

    fn thread_cpu_ns(&self) -> Option<u64> {
        sys::nanos(libc::CLOCK_THREAD_CPUTIME_ID)
    }
}

#[cfg(not(target_os = "linux"))]
impl ClockSource for SystemClockSource {
    fn wall(&self) -> Option<PackedClock> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(PackedClock::from_duration)
    }

    fn monotonic(&self) -> Option<PackedClock> {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        Some(PackedClock::from_duration(
            ORIGIN.get_or_init(Instant::now).elapsed(),
        ))
    }

    fn process_cpu_ns(&self) -> Option<u64> {
        None
    }

    fn thread_cpu_ns(&self) -> Option<u64> {
        None
    }
}

/// Hand-driven source for tests and simulations
///
/// Every reading can be moved independently, rewound, or made unavailable.
#[derive(Debug)]
pub struct ManualClockSource {
    wall: AtomicU64,
    monotonic: AtomicU64,
    wall_available: AtomicBool,
    monotonic_available: AtomicBool,
    process_cpu: AtomicU64,
    thread_cpu: AtomicU64,
}

impl ManualClockSource {
    pub fn new(wall: PackedClock, monotonic: PackedClock) -> Self {
        ManualClockSource {
            wall: AtomicU64::new(wall.to_bits()),
            monotonic: AtomicU64::new(monotonic.to_bits()),
            wall_available: AtomicBool::new(true),
            monotonic_available: AtomicBool::new(true),
            process_cpu: AtomicU64::new(0),
            thread_cpu: AtomicU64::new(0),
        }
    }

    /// Move both clocks forward by `d`
    pub fn advance(&self, d: Duration) {
        self.advance_wall(d);
        self.advance_monotonic(d);
    }

    pub fn advance_wall(&self, d: Duration) {
        self.set_wall(self.peek_wall().saturating_add(d));
    }

    pub fn advance_monotonic(&self, d: Duration) {
        self.set_monotonic(self.peek_monotonic().saturating_add(d));
    }

    pub fn set_wall(&self, value: PackedClock) {
        self.wall.store(value.to_bits(), Ordering::Release);
    }

    pub fn set_monotonic(&self, value: PackedClock) {
        self.monotonic.store(value.to_bits(), Ordering::Release);
    }

    pub fn set_wall_available(&self, available: bool) {
        self.wall_available.store(available, Ordering::Release);
    }

    pub fn set_monotonic_available(&self, available: bool) {
        self.monotonic_available.store(available, Ordering::Release);
    }

    pub fn set_process_cpu_ns(&self, ns: u64) {
        self.process_cpu.store(ns, Ordering::Release);
    }

    pub fn set_thread_cpu_ns(&self, ns: u64) {
        self.thread_cpu.store(ns, Ordering::Release);
    }

    /// Current wall value, even when marked unavailable
    pub fn peek_wall(&self) -> PackedClock {
        PackedClock::from_bits(self.wall.load(Ordering::Acquire))
    }

    /// Current monotonic value, even when marked unavailable
    pub fn peek_monotonic(&self) -> PackedClock {
        PackedClock::from_bits(self.monotonic.load(Ordering::Acquire))
    }
}

impl Default for ManualClockSource {
    fn default() -> Self {
        Self::new(PackedClock::new(1_700_000_000, 0), PackedClock::new(1000, 0))
    }
}

impl ClockSource for ManualClockSource {
    fn wall(&self) -> Option<PackedClock> {
        self.wall_available
            .load(Ordering::Acquire)
            .then(|| self.peek_wall())
    }

    fn monotonic(&self) -> Option<PackedClock> {
        self.monotonic_available
            .load(Ordering::Acquire)
            .then(|| self.peek_monotonic())
    }

    fn process_cpu_ns(&self) -> Option<u64> {
        Some(self.process_cpu.load(Ordering::Acquire))
    }

    fn thread_cpu_ns(&self) -> Option<u64> {
        Some(self.thread_cpu.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_source_reads() {
        let src = SystemClockSource;
        let wall = src.wall().expect("wall clock");
        // After 2020-01-01
        assert!(wall.secs() > 1_577_836_800);

        let m1 = src.monotonic().expect("monotonic clock");
        let m2 = src.monotonic().expect("monotonic clock");
        assert!(m2 >= m1);
    }

    #[test]
    fn test_manual_source_controls() {
        let src = ManualClockSource::new(PackedClock::new(10, 0), PackedClock::new(5, 0));
        src.advance(Duration::from_millis(1500));
        assert_eq!(src.wall(), Some(PackedClock::new(11, 500_000)));
        assert_eq!(src.monotonic(), Some(PackedClock::new(6, 500_000)));

        src.set_monotonic_available(false);
        assert_eq!(src.monotonic(), None);
        assert_eq!(src.peek_monotonic(), PackedClock::new(6, 500_000));

        src.set_thread_cpu_ns(42);
        assert_eq!(src.thread_cpu_ns(), Some(42));
    }
}
