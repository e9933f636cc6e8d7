//! Time primitives for Stratus
//!
//! Every date handled by the proxy is a [`PackedClock`]: a (seconds,
//! microseconds) pair packed into one `u64` (seconds in the high 32 bits,
//! microseconds in the low 32 bits). Because the microsecond part is always
//! below one second, integer order on the packed form is chronological order,
//! which lets a single atomic word hold a shared date.

use std::fmt;
use std::ops::Sub;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Microseconds per second
pub const USEC_PER_SEC: u32 = 1_000_000;

/// A date as (seconds, microseconds), packed 32:32
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PackedClock(u64);

impl PackedClock {
    pub const ZERO: PackedClock = PackedClock(0);
    pub const MAX: PackedClock = PackedClock(((u32::MAX as u64) << 32) | (USEC_PER_SEC as u64 - 1));

    /// Build from seconds and microseconds. Microseconds beyond one second
    /// are carried into the seconds part.
    #[inline]
    pub fn new(secs: u32, usecs: u32) -> Self {
        let carry = usecs / USEC_PER_SEC;
        let usecs = usecs % USEC_PER_SEC;
        PackedClock(((secs.saturating_add(carry) as u64) << 32) | usecs as u64)
    }

    /// Reinterpret a packed word. The microsecond half is normalised.
    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Self::new((bits >> 32) as u32, bits as u32)
    }

    #[inline]
    pub fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn secs(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn usecs(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        let secs = (micros / USEC_PER_SEC as u64).min(u32::MAX as u64) as u32;
        Self::new(secs, (micros % USEC_PER_SEC as u64) as u32)
    }

    /// Sub-microsecond precision is truncated.
    #[inline]
    pub fn from_duration(d: Duration) -> Self {
        let secs = d.as_secs().min(u32::MAX as u64) as u32;
        Self::new(secs, d.subsec_micros())
    }

    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::new(self.secs() as u64, self.usecs() * 1000)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.secs() as u64 * 1000 + self.usecs() as u64 / 1000
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.secs() as u64 * USEC_PER_SEC as u64 + self.usecs() as u64
    }

    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.secs() as u64 * 1_000_000_000 + self.usecs() as u64 * 1000
    }

    #[inline]
    pub fn saturating_add(self, d: Duration) -> Self {
        let micros = self.as_micros().saturating_add(d.as_micros().min(u64::MAX as u128) as u64);
        if micros >= PackedClock::MAX.as_micros() {
            PackedClock::MAX
        } else {
            Self::from_micros(micros)
        }
    }

    #[inline]
    pub fn saturating_sub(self, d: Duration) -> Self {
        let sub = d.as_micros().min(u64::MAX as u128) as u64;
        Self::from_micros(self.as_micros().saturating_sub(sub))
    }

    /// Elapsed time since `earlier`, or `None` if `earlier` is later than `self`.
    #[inline]
    pub fn checked_duration_since(self, earlier: PackedClock) -> Option<Duration> {
        self.as_micros()
            .checked_sub(earlier.as_micros())
            .map(Duration::from_micros)
    }
}

impl Sub<PackedClock> for PackedClock {
    type Output = Duration;

    /// Saturates at zero when `rhs` is later than `self`.
    #[inline]
    fn sub(self, rhs: PackedClock) -> Self::Output {
        self.checked_duration_since(rhs).unwrap_or(Duration::ZERO)
    }
}

impl From<Duration> for PackedClock {
    fn from(d: Duration) -> Self {
        PackedClock::from_duration(d)
    }
}

impl fmt::Debug for PackedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}s", self.secs(), self.usecs())
    }
}

impl fmt::Display for PackedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs(), self.usecs())
    }
}

/// A [`PackedClock`] shared between threads
///
/// Only moves forward through [`AtomicPackedClock::fetch_advance`].
#[derive(Default)]
pub struct AtomicPackedClock(AtomicU64);

impl AtomicPackedClock {
    pub const fn new(value: PackedClock) -> Self {
        AtomicPackedClock(AtomicU64::new(value.0))
    }

    #[inline]
    pub fn load(&self) -> PackedClock {
        PackedClock(self.0.load(Ordering::Acquire))
    }

    /// Unconditional store; reserved for initialisation.
    #[inline]
    pub fn store(&self, value: PackedClock) {
        self.0.store(value.0, Ordering::Release);
    }

    /// Advance to `candidate` if it is later than the current value.
    ///
    /// Returns the value held after the call, which is never earlier than
    /// either `candidate` or the value seen on entry.
    pub fn fetch_advance(&self, candidate: PackedClock) -> PackedClock {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if candidate.0 <= current {
                return PackedClock(current);
            }
            match self.0.compare_exchange_weak(
                current,
                candidate.0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

impl fmt::Debug for AtomicPackedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicPackedClock").field(&self.load()).finish()
    }
}
