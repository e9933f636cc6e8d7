//! Error types for Stratus

use thiserror::Error;

/// Core Stratus errors
///
/// These are the recoverable failures. Invariant violations never show up
/// here, see [`crate::invariants`].
#[derive(Error, Debug)]
pub enum StratusError {
    // Clock errors
    #[error("Clock source unavailable: {0}")]
    ClockUnavailable(&'static str),

    #[error("Signal timer setup failed: {0}")]
    TimerSetup(#[source] std::io::Error),

    #[error("Signal timers are not supported on this platform")]
    TimerUnsupported,

    // Buffer errors
    #[error("Buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("No room left in HTX message for {0} bytes")]
    HtxNoSpace(usize),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),
}

/// Result type for Stratus operations
pub type StratusResult<T> = Result<T, StratusError>;
