//! Stratus Mux - HTTP content paths of QUIC streams
//!
//! This crate provides:
//! - Streams with their receive buffer and send queue
//! - The application protocol seam ([`AppOps`]) and the hq-interop encoder
//! - Receive, send and reset operations over HTX buffers

pub mod app;
pub mod http;
pub mod stream;

pub use app::*;
pub use http::*;
pub use stream::*;
