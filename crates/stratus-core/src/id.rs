//! Identity types for Stratus

use std::fmt;

/// Transport stream identity (QUIC stream id)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId(pub u64);

impl StreamId {
    #[inline]
    pub fn new(id: u64) -> Self {
        StreamId(id)
    }

    /// Client-initiated streams have the low bit clear.
    #[inline]
    pub fn is_client_initiated(self) -> bool {
        self.0 & 0x1 == 0
    }

    /// Bidirectional streams have bit 1 clear.
    #[inline]
    pub fn is_bidirectional(self) -> bool {
        self.0 & 0x2 == 0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker thread number, dense from 0
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadNum(pub usize);

impl fmt::Debug for ThreadNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

impl fmt::Display for ThreadNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
