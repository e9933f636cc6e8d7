//! HTX blocks
//!
//! Each block is described by an 8-byte table entry: a 32-bit `info` word
//! and the 32-bit offset of its payload in the area.
//!
//! `info` layout:
//! - bits 28..32: block type
//! - header/trailer: bits 8..28 value length, bits 0..8 name length
//! - other types: bits 0..28 payload size

use std::fmt;

/// Size of one block table entry
pub const BLOCK_ENTRY_SIZE: usize = 8;

/// Longest header or trailer name
pub const MAX_NAME_LEN: usize = 0xFF;

/// Longest header or trailer value
pub const MAX_VALUE_LEN: usize = 0xF_FFFF;

/// Largest payload of any other block
pub const MAX_BLOCK_SIZE: usize = 0x0FFF_FFFF;

/// Block types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    /// Request start line
    ReqSl = 0,
    /// Response start line
    ResSl = 1,
    /// Header field
    Hdr = 2,
    /// End of headers
    Eoh = 3,
    /// Body data
    Data = 4,
    /// Trailer field
    Tlr = 5,
    /// End of trailers
    Eot = 6,
    /// Removed or never used
    Unused = 15,
}

impl BlockType {
    pub fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(BlockType::ReqSl),
            1 => Some(BlockType::ResSl),
            2 => Some(BlockType::Hdr),
            3 => Some(BlockType::Eoh),
            4 => Some(BlockType::Data),
            5 => Some(BlockType::Tlr),
            6 => Some(BlockType::Eot),
            15 => Some(BlockType::Unused),
            _ => None,
        }
    }

    #[inline]
    pub fn to_nibble(self) -> u8 {
        self as u8
    }

    /// Start-line, header and end-of-headers blocks
    #[inline]
    pub fn is_header_section(self) -> bool {
        matches!(self, BlockType::ReqSl | BlockType::ResSl | BlockType::Hdr | BlockType::Eoh)
    }

    /// Trailer and end-of-trailers blocks
    #[inline]
    pub fn is_trailer_section(self) -> bool {
        matches!(self, BlockType::Tlr | BlockType::Eot)
    }

    /// Section terminators
    #[inline]
    pub fn is_end_marker(self) -> bool {
        matches!(self, BlockType::Eoh | BlockType::Eot)
    }

    #[inline]
    pub fn is_start_line(self) -> bool {
        matches!(self, BlockType::ReqSl | BlockType::ResSl)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockType::ReqSl => "REQ_SL",
            BlockType::ResSl => "RES_SL",
            BlockType::Hdr => "HDR",
            BlockType::Eoh => "EOH",
            BlockType::Data => "DATA",
            BlockType::Tlr => "TLR",
            BlockType::Eot => "EOT",
            BlockType::Unused => "UNUSED",
        };
        f.write_str(name)
    }
}

/// Packed `info` word of a block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo(pub u32);

impl BlockInfo {
    /// Info for a header or trailer field
    #[inline]
    pub fn field(ty: BlockType, name_len: usize, value_len: usize) -> Self {
        debug_assert!(name_len <= MAX_NAME_LEN && value_len <= MAX_VALUE_LEN);
        BlockInfo(((ty.to_nibble() as u32) << 28) | ((value_len as u32) << 8) | name_len as u32)
    }

    /// Info for a block carrying `size` opaque bytes
    #[inline]
    pub fn sized(ty: BlockType, size: usize) -> Self {
        debug_assert!(size <= MAX_BLOCK_SIZE);
        BlockInfo(((ty.to_nibble() as u32) << 28) | size as u32)
    }

    #[inline]
    pub fn block_type(self) -> BlockType {
        BlockType::from_nibble((self.0 >> 28) as u8).unwrap_or(BlockType::Unused)
    }

    #[inline]
    fn is_field(self) -> bool {
        matches!(self.block_type(), BlockType::Hdr | BlockType::Tlr)
    }

    #[inline]
    pub fn name_len(self) -> usize {
        if self.is_field() {
            (self.0 & 0xFF) as usize
        } else {
            0
        }
    }

    #[inline]
    pub fn value_len(self) -> usize {
        if self.is_field() {
            ((self.0 >> 8) & 0xF_FFFF) as usize
        } else {
            0
        }
    }

    /// Payload size in bytes
    #[inline]
    pub fn size(self) -> usize {
        if self.is_field() {
            self.name_len() + self.value_len()
        } else {
            (self.0 & 0x0FFF_FFFF) as usize
        }
    }

    /// Same type, payload size changed (non-field blocks only)
    #[inline]
    pub fn with_size(self, size: usize) -> Self {
        BlockInfo::sized(self.block_type(), size)
    }
}

/// Borrowed view of one block
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub(crate) pos: u32,
    pub(crate) info: BlockInfo,
    pub(crate) payload: &'a [u8],
}

impl<'a> Block<'a> {
    /// Position in the block table
    #[inline]
    pub fn pos(&self) -> u32 {
        self.pos
    }

    #[inline]
    pub fn block_type(&self) -> BlockType {
        self.info.block_type()
    }

    #[inline]
    pub fn info(&self) -> BlockInfo {
        self.info
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Raw payload
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Field name of a header or trailer block, empty otherwise
    pub fn name(&self) -> &'a [u8] {
        &self.payload[..self.info.name_len()]
    }

    /// Field value of a header or trailer block, empty otherwise
    pub fn value(&self) -> &'a [u8] {
        let n = self.info.name_len();
        &self.payload[n..n + self.info.value_len()]
    }

    /// Decoded start line, for start-line blocks
    pub fn start_line(&self) -> Option<StartLine<'a>> {
        if !self.block_type().is_start_line() {
            return None;
        }
        StartLine::decode(self.payload)
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({}@{}, {} bytes)", self.block_type(), self.pos, self.size())
    }
}

/// The three parts of a start line.
///
/// Requests carry method, uri and version; responses carry version, status
/// and reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartLine<'a> {
    pub parts: [&'a [u8]; 3],
}

impl<'a> StartLine<'a> {
    /// Length prefix: three little-endian u16 part lengths
    pub const PREFIX_LEN: usize = 6;

    pub fn new(p1: &'a [u8], p2: &'a [u8], p3: &'a [u8]) -> Self {
        StartLine { parts: [p1, p2, p3] }
    }

    /// Encoded payload size
    pub fn encoded_len(&self) -> usize {
        Self::PREFIX_LEN + self.parts.iter().map(|p| p.len()).sum::<usize>()
    }

    /// Encode into `out`, which must be exactly `encoded_len()` bytes
    pub(crate) fn encode(&self, out: &mut [u8]) {
        let mut at = Self::PREFIX_LEN;
        for (i, part) in self.parts.iter().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&(part.len() as u16).to_le_bytes());
            out[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
    }

    pub fn decode(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < Self::PREFIX_LEN {
            return None;
        }
        let mut parts: [&'a [u8]; 3] = [&[]; 3];
        let mut at = Self::PREFIX_LEN;
        for (i, part) in parts.iter_mut().enumerate() {
            let len = u16::from_le_bytes([payload[i * 2], payload[i * 2 + 1]]) as usize;
            *part = payload.get(at..at + len)?;
            at += len;
        }
        Some(StartLine { parts })
    }
}

/// Payload announced beyond what the message currently holds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadLength {
    /// Nothing more announced
    #[default]
    None,
    /// This many more payload bytes are expected
    Known(u64),
    /// Length not declared (chunked or close-delimited)
    Unknown,
}

impl PayloadLength {
    const UNKNOWN_RAW: u64 = u64::MAX;

    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => PayloadLength::None,
            Self::UNKNOWN_RAW => PayloadLength::Unknown,
            n => PayloadLength::Known(n),
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            PayloadLength::None | PayloadLength::Known(0) => 0,
            PayloadLength::Known(n) => n.min(Self::UNKNOWN_RAW - 1),
            PayloadLength::Unknown => Self::UNKNOWN_RAW,
        }
    }

    /// `Known(0)` collapses to `None`
    pub fn normalized(self) -> Self {
        Self::from_raw(self.to_raw())
    }

    #[inline]
    pub fn is_unknown(self) -> bool {
        self == PayloadLength::Unknown
    }
}
