//! Stratus Time Engine - cheap, coherent "now" for every worker thread
//!
//! This crate implements the time-keeping engine:
//! - Clock sources (kernel, manual) with failure tolerance
//! - Per-thread cached local clock, monotonic by construction
//! - Lock-free global date advanced by the furthest-ahead thread
//! - Idle accounting around poller waits
//! - CPU / monotonic time readers, fresh and cached
//! - Periodic signal timer and ISO-8601 timestamps

pub mod clock;
pub mod engine;
pub mod idle;
pub mod iso;
pub mod source;
pub mod timer;

pub use clock::*;
pub use engine::*;
pub use idle::*;
pub use iso::*;
pub use source::*;
pub use timer::*;
