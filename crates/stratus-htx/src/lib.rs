//! Stratus HTX - structured HTTP messages in raw buffers
//!
//! An HTX message lives inside a fixed-size [`Buffer`]:
//! - 32-byte message header
//! - payloads growing up from the header
//! - block table growing down from the end of the area
//!
//! [`Htx`] is a borrowing view over such a buffer; [`xfer_blks`] moves
//! blocks between two views.

pub mod block;
pub mod buffer;
pub mod flags;
pub mod htx;
pub mod xfer;

pub use block::*;
pub use buffer::*;
pub use flags::*;
pub use htx::*;
pub use xfer::*;
