//! HTX content paths of a stream
//!
//! The upper layer exchanges HTX messages with the multiplexer through
//! caller-owned buffers. These functions move message blocks between such a
//! buffer and the stream.

use stratus_core::{bug_on, Invariant};
use stratus_htx::{xfer_blks, BlockType, Buffer, Htx, PayloadLength};
use tracing::{debug, trace};

use crate::{AppOps, Stream, StreamFlags};

/// Hand received message blocks over to the upper layer.
///
/// Moves at most `count` payload bytes from the stream receive buffer into
/// `buf`. Returns the payload bytes moved and whether the end of the
/// message was delivered.
pub fn rcv_buf(stream: &mut Stream, buf: &mut Buffer, count: usize) -> (usize, bool) {
    let id = stream.id();
    trace!(stream = %id, count, "rcv_buf enter");

    let (ret, fin) = rcv_htx(stream.rx_app_buf_raw(), buf, count);
    if fin {
        stream.flags.insert(StreamFlags::EOM_RECV);
    }

    trace!(stream = %id, moved = ret, fin, "rcv_buf leave");
    (ret, fin)
}

fn rcv_htx(rx: &mut Buffer, buf: &mut Buffer, count: usize) -> (usize, bool) {
    let src = Htx::from_buf(rx);
    if src.is_empty() {
        return (0, false);
    }
    let total = src.data();

    let dst = Htx::from_buf(buf);
    if dst.is_empty() && src.used_space() <= count && dst.size() == src.size() {
        let fin = src.is_eom();
        dst.to_buf();
        src.to_buf();
        let raw = rx.data();
        buf.xfer(rx, raw);
        debug!(moved = total, fin, "whole receive buffer swapped");
        return (total, fin);
    }

    let (mut src, mut dst) = (src, dst);
    xfer_blks(&mut dst, &mut src, count);
    bug_on!(
        src.is_parsing_error(),
        Invariant::XferLeftParsingError,
        "{} payload bytes left in receive buffer",
        src.data()
    );

    let mut fin = false;
    if src.is_empty() && src.is_eom() {
        dst.set_eom();
        fin = true;
    }

    dst.set_extra(match src.extra() {
        PayloadLength::Known(n) => PayloadLength::Known(src.data() as u64 + n),
        PayloadLength::Unknown => PayloadLength::Unknown,
        PayloadLength::None => PayloadLength::None,
    });

    (total - src.data(), fin)
}

/// Encode an outgoing message from `buf` onto the stream.
///
/// `count` bounds the payload bytes consumed from `buf`. Returns the
/// payload bytes consumed and whether the whole message has been sent.
pub fn snd_buf(stream: &mut Stream, app: &dyn AppOps, buf: &mut Buffer, count: usize) -> (usize, bool) {
    let id = stream.id();
    trace!(stream = %id, count, app = app.name(), "snd_buf enter");

    let mut htx = Htx::from_buf(buf);
    if htx.extra().is_unknown() {
        stream.flags.insert(StreamFlags::UNKNOWN_PL_LENGTH);
    }

    let ret = app.encode_into(stream, &mut htx, count);
    let fin = htx.is_eom() && htx.is_empty();
    if fin {
        stream.flags.insert(StreamFlags::FIN_SENT);
    }
    htx.to_buf();

    trace!(stream = %id, consumed = ret, fin, "snd_buf leave");
    (ret, fin)
}

/// Discard an outgoing message that will no longer be sent.
///
/// Returns `count` unchanged.
pub fn reset_buf(stream: &mut Stream, buf: &mut Buffer, count: usize) -> usize {
    let id = stream.id();
    trace!(stream = %id, count, "reset_buf enter");

    let mut htx = Htx::from_buf(buf);
    htx.reset();
    htx.to_buf();
    stream.flags.insert(StreamFlags::RESET);

    trace!(stream = %id, "reset_buf leave");
    count
}

/// Record a FIN that arrived without payload.
///
/// Makes sure the receive buffer carries an end of message, adding an
/// empty end-of-trailers block when the message holds no block to keep the
/// flag alive.
pub fn handle_standalone_fin(stream: &mut Stream) {
    let id = stream.id();
    trace!(stream = %id, "standalone fin enter");

    let appbuf = stream.rx_app_buf();
    bug_on!(appbuf.is_null(), Invariant::RxBufferMissing, "stream {}", id);

    let mut htx = Htx::from_buf(appbuf);
    if htx.is_empty() {
        bug_on!(
            htx.add_endof(BlockType::Eot).is_err(),
            Invariant::EndMarkerInsert,
            "stream {}",
            id
        );
    }
    htx.set_eom();
    htx.to_buf();

    trace!(stream = %id, "standalone fin leave");
}
