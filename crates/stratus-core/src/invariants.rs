//! Stratus hard invariants
//!
//! These are contract violations, not runtime errors. When one of them is
//! observed the framing of at least one HTTP message is already corrupt, so
//! the only acceptable outcome is to stop the caller path on the spot.
//!
//! # Usage
//!
//! ```rust
//! use stratus_core::{bug_on, invariants::Invariant};
//!
//! let parsing_error = false;
//! bug_on!(parsing_error, Invariant::XferLeftParsingError, "stream 4");
//! ```
//!
//! Debug builds panic (so tests can observe the violation), release builds
//! abort the process.

use std::fmt;

/// The hard invariants of the data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Invariant {
    /// A block transfer out of a stream receive buffer left the source
    /// flagged with a parsing error.
    XferLeftParsingError = 1,

    /// An end-of-trailers marker could not be added to an empty message.
    EndMarkerInsert = 2,

    /// A stream receive buffer was expected to be allocated.
    RxBufferMissing = 3,
}

impl Invariant {
    /// Get the invariant code (e.g., "BUG-1")
    pub fn code(&self) -> &'static str {
        match self {
            Invariant::XferLeftParsingError => "BUG-1",
            Invariant::EndMarkerInsert => "BUG-2",
            Invariant::RxBufferMissing => "BUG-3",
        }
    }

    /// Get the short name of the invariant
    pub fn name(&self) -> &'static str {
        match self {
            Invariant::XferLeftParsingError => "transfer left a parsing error on the source",
            Invariant::EndMarkerInsert => "end marker rejected by an empty message",
            Invariant::RxBufferMissing => "receive buffer not allocated",
        }
    }

    /// Get all invariants
    pub fn all() -> &'static [Invariant] {
        &[
            Invariant::XferLeftParsingError,
            Invariant::EndMarkerInsert,
            Invariant::RxBufferMissing,
        ]
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.name())
    }
}

/// Invariant violation report
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub invariant: Invariant,
    pub context: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stratus invariant violation: {} - {}",
            self.invariant, self.context
        )
    }
}

impl std::error::Error for InvariantViolation {}

/// Stop the current caller path after an invariant violation.
///
/// # Panics
///
/// Always panics in debug builds. Release builds abort instead.
#[cold]
#[track_caller]
pub fn invariant_violated(invariant: Invariant, context: &str) -> ! {
    let violation = InvariantViolation {
        invariant,
        context: context.to_string(),
    };
    tracing::error!(code = invariant.code(), "{}", violation);

    if cfg!(debug_assertions) {
        panic!("{}", violation);
    }
    std::process::abort();
}

/// Stop the caller path when `$cond` holds.
#[macro_export]
macro_rules! bug_on {
    ($cond:expr, $inv:expr, $($ctx:tt)+) => {
        if $cond {
            $crate::invariants::invariant_violated($inv, &format!($($ctx)+));
        }
    };
}
