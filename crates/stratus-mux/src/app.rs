//! Application protocol layer
//!
//! The multiplexer does not know how HTTP is framed on the wire. Each
//! connection selects one [`AppOps`] implementation that turns outgoing
//! HTX messages into stream bytes.

use stratus_htx::{BlockType, Htx};
use tracing::trace;

use crate::Stream;

/// Per-protocol encoder for outgoing messages
pub trait AppOps: Send + Sync {
    /// Protocol name, as negotiated
    fn name(&self) -> &'static str;

    /// Consume blocks from `htx` into `stream`'s send buffer.
    ///
    /// `budget` bounds the payload bytes consumed. Returns the payload
    /// bytes consumed.
    fn encode_into(&self, stream: &mut Stream, htx: &mut Htx<'_>, budget: usize) -> usize;
}

/// HTTP/0.9 over QUIC, as used by interop test runners.
///
/// Only the body goes on the wire; start line, headers and trailers are
/// consumed silently.
#[derive(Clone, Copy, Debug, Default)]
pub struct HqInterop;

impl AppOps for HqInterop {
    fn name(&self) -> &'static str {
        "hq-interop"
    }

    fn encode_into(&self, stream: &mut Stream, htx: &mut Htx<'_>, budget: usize) -> usize {
        let mut total = 0;

        while let Some(blk) = htx.head_block() {
            match blk.block_type() {
                BlockType::Data => {
                    let room = stream.tx.room().min(budget.saturating_sub(total));
                    if room == 0 {
                        break;
                    }
                    let size = blk.size();
                    let n = stream.tx.push(&blk.payload()[..size.min(room)]);
                    htx.cut_data_head(n);
                    total += n;
                    if n < size {
                        break;
                    }
                }
                _ => {
                    // markers are free, other blocks must fit whole
                    let size = blk.size();
                    if size > budget - total {
                        break;
                    }
                    total += size;
                    htx.remove_head();
                }
            }
        }

        trace!(stream = %stream.id(), total, queued = stream.tx.len(), "hq-interop encoded");
        total
    }
}
