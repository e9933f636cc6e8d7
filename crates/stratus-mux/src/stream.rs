//! Transport streams as seen by the content multiplexer

use bytes::{Bytes, BytesMut};
use stratus_core::StreamId;
use stratus_htx::Buffer;

/// Stream state flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamFlags(pub u32);

impl StreamFlags {
    pub const NONE: StreamFlags = StreamFlags(0);

    /// Last data handed to the transport
    pub const FIN_SENT: u32 = 0x0000_0001;
    /// End of message delivered to the upper layer
    pub const EOM_RECV: u32 = 0x0000_0002;
    /// Outgoing payload length not declared by the upper layer
    pub const UNKNOWN_PL_LENGTH: u32 = 0x0000_0004;
    /// Pending outgoing data was discarded
    pub const RESET: u32 = 0x0000_0008;

    #[inline]
    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    #[inline]
    pub fn insert(&mut self, bits: u32) {
        self.0 |= bits;
    }

    #[inline]
    pub fn remove(&mut self, bits: u32) {
        self.0 &= !bits;
    }
}

/// Buffer sizes for new streams
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Receive buffer, holds one HTX message
    pub rx_buf_size: usize,
    /// Encoded bytes waiting for the transport
    pub tx_buf_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rx_buf_size: 16 * 1024,
            tx_buf_size: 16 * 1024,
        }
    }
}

impl StreamConfig {
    /// Small buffers, to exercise partial transfers
    pub fn small() -> Self {
        Self {
            rx_buf_size: 1024,
            tx_buf_size: 256,
        }
    }
}

/// Encoded outgoing bytes and counters
#[derive(Debug)]
pub struct TxBuf {
    buf: BytesMut,
    capacity: usize,
    offset: u64,
}

impl TxBuf {
    pub fn new(capacity: usize) -> Self {
        TxBuf {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            offset: 0,
        }
    }

    /// Bytes that can still be queued
    #[inline]
    pub fn room(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Bytes queued
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes ever queued on this stream
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Queue as much of `data` as fits. Returns the count queued.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.room());
        self.buf.extend_from_slice(&data[..n]);
        self.offset += n as u64;
        n
    }

    /// Hand everything queued to the transport
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// A bidirectional transport stream
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    pub flags: StreamFlags,
    rx_app_buf: Buffer,
    rx_buf_size: usize,
    pub tx: TxBuf,
}

impl Stream {
    pub fn new(id: StreamId, config: &StreamConfig) -> Self {
        Stream {
            id,
            flags: StreamFlags::NONE,
            rx_app_buf: Buffer::new(config.rx_buf_size),
            rx_buf_size: config.rx_buf_size,
            tx: TxBuf::new(config.tx_buf_size),
        }
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Receive buffer, allocated on first use
    pub fn rx_app_buf(&mut self) -> &mut Buffer {
        if self.rx_app_buf.is_null() {
            self.rx_app_buf = Buffer::new(self.rx_buf_size);
        }
        &mut self.rx_app_buf
    }

    /// Receive buffer as it is, possibly unallocated
    #[inline]
    pub fn rx_app_buf_raw(&mut self) -> &mut Buffer {
        &mut self.rx_app_buf
    }

    /// Give the receive buffer back once it is drained
    pub fn release_rx_buf(&mut self) -> bool {
        if !self.rx_app_buf.is_empty() {
            return false;
        }
        self.rx_app_buf = Buffer::null();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_flags() {
        let mut flags = StreamFlags::NONE;
        flags.insert(StreamFlags::FIN_SENT | StreamFlags::RESET);
        assert!(flags.contains(StreamFlags::FIN_SENT));
        assert!(flags.contains(StreamFlags::RESET));
        assert!(!flags.contains(StreamFlags::EOM_RECV));
        flags.remove(StreamFlags::RESET);
        assert!(!flags.contains(StreamFlags::RESET));
    }

    #[test]
    fn test_tx_buf_room() {
        let mut tx = TxBuf::new(8);
        assert_eq!(tx.push(b"hello world"), 8);
        assert_eq!(tx.room(), 0);
        assert_eq!(&tx.take()[..], b"hello wo");
        assert_eq!(tx.room(), 8);
        assert_eq!(tx.offset(), 8);
    }

    #[test]
    fn test_rx_buf_lazy_allocation() {
        let mut stream = Stream::new(StreamId::new(0), &StreamConfig::small());
        assert!(stream.release_rx_buf());
        assert!(stream.rx_app_buf_raw().is_null());
        assert_eq!(stream.rx_app_buf().size(), 1024);
    }

    #[test]
    fn test_release_keeps_pending_data() {
        let mut stream = Stream::new(StreamId::new(4), &StreamConfig::default());
        stream.rx_app_buf().put_slice(b"x");
        assert!(!stream.release_rx_buf());
        assert_eq!(stream.rx_app_buf().data(), 1);
    }
}
