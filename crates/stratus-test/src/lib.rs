//! Stratus Test Harness - simulation and end-to-end validation
//!
//! This crate provides:
//! - Poll loop simulation over scripted clock sources
//! - HTX message fixtures and test logging
//! - End-to-end stream flows
//! - Benchmarks (see `benches/`)

pub mod fixtures;
pub mod integration;
pub mod poll_simulator;

pub use fixtures::*;
pub use integration::*;
pub use poll_simulator::*;
