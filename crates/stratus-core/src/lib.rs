//! Stratus Core - Fundamental types and primitives
//!
//! This crate defines the types shared by the data-plane crates:
//! - Identifiers (StreamId, ThreadNum)
//! - Time primitives (PackedClock, AtomicPackedClock)
//! - Hard invariants and the `bug_on!` stop path
//! - Error type

pub mod id;
pub mod time;
pub mod invariants;
pub mod error;

pub use id::*;
pub use time::*;
pub use invariants::{Invariant, InvariantViolation};
pub use error::*;
