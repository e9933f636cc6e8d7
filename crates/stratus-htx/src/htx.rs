//! Structured message view over a raw buffer
//!
//! Area layout:
//!
//! ```text
//! [ header (32) | payload -> ...free... <- block table ]
//! ```
//!
//! Header (little-endian):
//! - bytes 0-3: payload byte count
//! - bytes 4-7: head block position
//! - bytes 8-11: tail block position
//! - bytes 12-15: head payload address
//! - bytes 16-19: payload end address
//! - bytes 20-23: flags
//! - bytes 24-31: announced extra payload length
//!
//! The entry for block position `p` sits `(p + 1) * 8` bytes before the end
//! of the area. Payloads are stored in block order, so the tail block's
//! payload always ends at the payload end address.

use std::fmt;

use stratus_core::{StratusError, StratusResult};

use crate::{
    Block, BlockInfo, BlockType, Buffer, HtxFlags, PayloadLength, StartLine, BLOCK_ENTRY_SIZE,
    MAX_BLOCK_SIZE, MAX_NAME_LEN, MAX_VALUE_LEN,
};

/// Size of the message header at the start of the area
pub const HTX_HDR_SIZE: usize = 32;

const NONE_POS: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HtxHeader {
    data: u32,
    head: u32,
    tail: u32,
    head_addr: u32,
    tail_addr: u32,
    flags: HtxFlags,
    extra: u64,
}

impl HtxHeader {
    fn empty() -> Self {
        HtxHeader {
            data: 0,
            head: NONE_POS,
            tail: NONE_POS,
            head_addr: HTX_HDR_SIZE as u32,
            tail_addr: HTX_HDR_SIZE as u32,
            flags: HtxFlags::NONE,
            extra: 0,
        }
    }

    fn read(area: &[u8]) -> Self {
        let word = |at: usize| u32::from_le_bytes([area[at], area[at + 1], area[at + 2], area[at + 3]]);
        let mut extra = [0u8; 8];
        extra.copy_from_slice(&area[24..32]);
        HtxHeader {
            data: word(0),
            head: word(4),
            tail: word(8),
            head_addr: word(12),
            tail_addr: word(16),
            flags: HtxFlags::new(word(20)),
            extra: u64::from_le_bytes(extra),
        }
    }

    fn write(&self, area: &mut [u8]) {
        area[0..4].copy_from_slice(&self.data.to_le_bytes());
        area[4..8].copy_from_slice(&self.head.to_le_bytes());
        area[8..12].copy_from_slice(&self.tail.to_le_bytes());
        area[12..16].copy_from_slice(&self.head_addr.to_le_bytes());
        area[16..20].copy_from_slice(&self.tail_addr.to_le_bytes());
        area[20..24].copy_from_slice(&self.flags.0.to_le_bytes());
        area[24..32].copy_from_slice(&self.extra.to_le_bytes());
    }

    /// Forget all blocks, keep flags and extra
    fn clear_blocks(&mut self) {
        *self = HtxHeader {
            flags: self.flags,
            extra: self.extra,
            ..HtxHeader::empty()
        };
    }
}

/// HTX message overlaid on a [`Buffer`].
///
/// While the view exists the raw buffer reports itself full. Dropping the
/// view (or calling [`Htx::to_buf`]) writes the header back; a message with
/// no blocks and no error is reset and leaves the raw buffer empty.
pub struct Htx<'a> {
    buf: &'a mut Buffer,
    hdr: HtxHeader,
}

impl<'a> Htx<'a> {
    /// Overlay `buf`. An empty buffer becomes an empty message.
    pub fn from_buf(buf: &'a mut Buffer) -> Self {
        debug_assert!(buf.size() <= u32::MAX as usize);
        let hdr = if buf.is_empty() || buf.size() < HTX_HDR_SIZE {
            HtxHeader::empty()
        } else {
            HtxHeader::read(buf.area())
        };
        let size = buf.size();
        buf.set_data(size);
        Htx { buf, hdr }
    }

    /// Finalize the view and give the raw buffer back
    pub fn to_buf(self) {}

    fn finalize(&mut self) {
        if self.buf.size() < HTX_HDR_SIZE {
            // no room for a header: nothing can have been stored
            self.buf.set_data(0);
            return;
        }
        if self.is_empty() && !self.hdr.flags.has_error() {
            self.hdr = HtxHeader::empty();
            self.buf.set_data(0);
        } else {
            self.hdr.write(self.buf.area_mut());
            let size = self.buf.size();
            self.buf.set_data(size);
        }
    }

    // ---- sizes -------------------------------------------------------

    /// Capacity for payload and block entries
    #[inline]
    pub fn size(&self) -> usize {
        self.buf.size().saturating_sub(HTX_HDR_SIZE)
    }

    /// Payload bytes held
    #[inline]
    pub fn data(&self) -> usize {
        self.hdr.data as usize
    }

    /// Number of blocks
    #[inline]
    pub fn nbblks(&self) -> usize {
        if self.hdr.head == NONE_POS {
            0
        } else {
            (self.hdr.tail - self.hdr.head + 1) as usize
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hdr.head == NONE_POS
    }

    /// Payload plus block entries
    #[inline]
    pub fn used_space(&self) -> usize {
        self.data() + self.nbblks() * BLOCK_ENTRY_SIZE
    }

    #[inline]
    pub fn free_space(&self) -> usize {
        self.size().saturating_sub(self.used_space())
    }

    // ---- flags and extra ---------------------------------------------

    #[inline]
    pub fn flags(&self) -> HtxFlags {
        self.hdr.flags
    }

    #[inline]
    pub fn flags_mut(&mut self) -> &mut HtxFlags {
        &mut self.hdr.flags
    }

    #[inline]
    pub fn is_eom(&self) -> bool {
        self.hdr.flags.is_eom()
    }

    #[inline]
    pub fn set_eom(&mut self) {
        self.hdr.flags.set_eom(true);
    }

    #[inline]
    pub fn is_parsing_error(&self) -> bool {
        self.hdr.flags.is_parsing_error()
    }

    #[inline]
    pub fn extra(&self) -> PayloadLength {
        PayloadLength::from_raw(self.hdr.extra)
    }

    #[inline]
    pub fn set_extra(&mut self, extra: PayloadLength) {
        self.hdr.extra = extra.to_raw();
    }

    // ---- block table -------------------------------------------------

    #[inline]
    fn entry_offset(&self, pos: u32) -> usize {
        self.buf.size() - (pos as usize + 1) * BLOCK_ENTRY_SIZE
    }

    fn read_entry(&self, pos: u32) -> (BlockInfo, usize) {
        let at = self.entry_offset(pos);
        let area = self.buf.area();
        let info = u32::from_le_bytes([area[at], area[at + 1], area[at + 2], area[at + 3]]);
        let addr = u32::from_le_bytes([area[at + 4], area[at + 5], area[at + 6], area[at + 7]]);
        (BlockInfo(info), addr as usize)
    }

    fn write_entry(&mut self, pos: u32, info: BlockInfo, addr: usize) {
        let at = self.entry_offset(pos);
        let area = self.buf.area_mut();
        area[at..at + 4].copy_from_slice(&info.0.to_le_bytes());
        area[at + 4..at + 8].copy_from_slice(&(addr as u32).to_le_bytes());
    }

    /// Block at table position `pos`
    pub fn block(&self, pos: u32) -> Option<Block<'_>> {
        if self.is_empty() || pos < self.hdr.head || pos > self.hdr.tail {
            return None;
        }
        let (info, addr) = self.read_entry(pos);
        Some(Block {
            pos,
            info,
            payload: &self.buf.area()[addr..addr + info.size()],
        })
    }

    pub fn head_block(&self) -> Option<Block<'_>> {
        self.block(self.hdr.head)
    }

    pub fn tail_block(&self) -> Option<Block<'_>> {
        self.block(self.hdr.tail)
    }

    /// Blocks in message order
    pub fn blocks(&self) -> Blocks<'_> {
        let (next, end) = if self.is_empty() {
            (1, 0)
        } else {
            (self.hdr.head as u64, self.hdr.tail as u64)
        };
        Blocks { htx: self, next, end }
    }

    // ---- adding ------------------------------------------------------

    #[inline]
    fn next_pos(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.hdr.tail + 1
        }
    }

    /// Contiguous payload room left once `new_blocks` more entries exist.
    ///
    /// `None` when the entries alone would overlap the payload.
    fn tail_room(&self, new_blocks: usize) -> Option<usize> {
        let entries = self.next_pos() as usize + new_blocks;
        self.buf
            .size()
            .checked_sub(entries * BLOCK_ENTRY_SIZE)?
            .checked_sub(self.hdr.tail_addr as usize)
    }

    /// Contiguous room for `want` bytes, defragmenting when that helps
    fn room_for(&mut self, want: usize, new_blocks: usize) -> Option<usize> {
        let room = self.tail_room(new_blocks);
        if room.map_or(false, |r| r >= want) {
            return room;
        }
        let compacted = self
            .free_space()
            .checked_sub(new_blocks * BLOCK_ENTRY_SIZE);
        match (compacted, room) {
            (Some(c), Some(r)) if c <= r => room,
            (Some(_), _) => {
                self.defrag();
                self.tail_room(new_blocks)
            }
            (None, _) => room,
        }
    }

    /// Append a block with `len` payload bytes, returning its payload address
    fn push_block(&mut self, info: BlockInfo, len: usize) -> Option<usize> {
        match self.room_for(len, 1) {
            Some(room) if room >= len => {}
            _ => return None,
        }
        let pos = self.next_pos();
        let addr = self.hdr.tail_addr as usize;
        self.write_entry(pos, info, addr);
        if self.is_empty() {
            self.hdr.head = pos;
            self.hdr.head_addr = addr as u32;
        }
        self.hdr.tail = pos;
        self.hdr.tail_addr += len as u32;
        self.hdr.data += len as u32;
        Some(addr)
    }

    /// Append a copy of a block, without merging
    pub(crate) fn push_raw(&mut self, info: BlockInfo, payload: &[u8]) -> bool {
        match self.push_block(info, payload.len()) {
            Some(addr) => {
                self.buf.area_mut()[addr..addr + payload.len()].copy_from_slice(payload);
                true
            }
            None => false,
        }
    }

    /// Add a request or response start line
    pub fn add_stline(&mut self, ty: BlockType, sl: StartLine<'_>) -> StratusResult<()> {
        if !ty.is_start_line() {
            return Err(StratusError::InvalidBlock(format!("{} is not a start line", ty)));
        }
        if sl.parts.iter().any(|p| p.len() > u16::MAX as usize) || sl.encoded_len() > MAX_BLOCK_SIZE {
            return Err(StratusError::InvalidBlock("start line too long".into()));
        }
        let len = sl.encoded_len();
        let addr = self
            .push_block(BlockInfo::sized(ty, len), len)
            .ok_or(StratusError::HtxNoSpace(len))?;
        sl.encode(&mut self.buf.area_mut()[addr..addr + len]);
        Ok(())
    }

    fn add_field(&mut self, ty: BlockType, name: &[u8], value: &[u8]) -> StratusResult<()> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(StratusError::InvalidBlock(format!(
                "{} name length {} out of range",
                ty,
                name.len()
            )));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(StratusError::InvalidBlock(format!(
                "{} value length {} out of range",
                ty,
                value.len()
            )));
        }
        let len = name.len() + value.len();
        let addr = self
            .push_block(BlockInfo::field(ty, name.len(), value.len()), len)
            .ok_or(StratusError::HtxNoSpace(len))?;
        let area = self.buf.area_mut();
        area[addr..addr + name.len()].copy_from_slice(name);
        area[addr + name.len()..addr + len].copy_from_slice(value);
        Ok(())
    }

    /// Add a header field
    pub fn add_header(&mut self, name: &[u8], value: &[u8]) -> StratusResult<()> {
        self.add_field(BlockType::Hdr, name, value)
    }

    /// Add a trailer field
    pub fn add_trailer(&mut self, name: &[u8], value: &[u8]) -> StratusResult<()> {
        self.add_field(BlockType::Tlr, name, value)
    }

    /// Add an end-of-headers or end-of-trailers marker
    pub fn add_endof(&mut self, ty: BlockType) -> StratusResult<()> {
        if !ty.is_end_marker() {
            return Err(StratusError::InvalidBlock(format!("{} is not an end marker", ty)));
        }
        self.push_block(BlockInfo::sized(ty, 0), 0)
            .map(|_| ())
            .ok_or(StratusError::HtxNoSpace(0))
    }

    /// Append body data, merging into a trailing DATA block.
    ///
    /// Copies as much as fits and returns the number of bytes taken.
    pub fn add_data(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        if let Some(tail) = self.tail_block() {
            if tail.block_type() == BlockType::Data {
                let cur = tail.size();
                let want = data.len().min(MAX_BLOCK_SIZE - cur);
                let n = want.min(self.room_for(want, 0).unwrap_or(0));
                if n == 0 {
                    return 0;
                }
                // read after room_for: defrag renumbers blocks
                let pos = self.hdr.tail;
                let (info, addr) = self.read_entry(pos);
                let end = self.hdr.tail_addr as usize;
                self.buf.area_mut()[end..end + n].copy_from_slice(&data[..n]);
                self.write_entry(pos, info.with_size(cur + n), addr);
                self.hdr.tail_addr += n as u32;
                self.hdr.data += n as u32;
                return n;
            }
        }

        let want = data.len().min(MAX_BLOCK_SIZE);
        let n = want.min(self.room_for(want, 1).unwrap_or(0));
        if n == 0 {
            return 0;
        }
        if self.push_raw(BlockInfo::sized(BlockType::Data, n), &data[..n]) {
            n
        } else {
            0
        }
    }

    // ---- removing ----------------------------------------------------

    /// Remove the first block, returning its type
    pub fn remove_head(&mut self) -> Option<BlockType> {
        if self.is_empty() {
            return None;
        }
        let (info, _) = self.read_entry(self.hdr.head);
        self.hdr.data -= info.size() as u32;
        if self.hdr.head == self.hdr.tail {
            self.hdr.clear_blocks();
        } else {
            self.hdr.head += 1;
            let (_, addr) = self.read_entry(self.hdr.head);
            self.hdr.head_addr = addr as u32;
        }
        Some(info.block_type())
    }

    /// Remove the last block, returning its type
    pub fn remove_tail(&mut self) -> Option<BlockType> {
        if self.is_empty() {
            return None;
        }
        let (info, addr) = self.read_entry(self.hdr.tail);
        self.hdr.data -= info.size() as u32;
        if self.hdr.head == self.hdr.tail {
            self.hdr.clear_blocks();
        } else {
            self.hdr.tail -= 1;
            self.hdr.tail_addr = addr as u32;
        }
        Some(info.block_type())
    }

    /// Drop the first `n` bytes of the head DATA block.
    ///
    /// The block is removed once fully consumed. Returns the bytes cut.
    pub fn cut_data_head(&mut self, n: usize) -> usize {
        let Some(head) = self.head_block() else {
            return 0;
        };
        if head.block_type() != BlockType::Data {
            return 0;
        }
        let (pos, info, size) = (head.pos, head.info, head.size());
        if n >= size {
            self.remove_head();
            return size;
        }
        let (_, addr) = self.read_entry(pos);
        self.write_entry(pos, info.with_size(size - n), addr + n);
        self.hdr.head_addr = (addr + n) as u32;
        self.hdr.data -= n as u32;
        n
    }

    /// Remove up to `n` payload bytes from the front.
    ///
    /// Whole blocks go first; a DATA block may be cut. Draining everything
    /// removes all blocks but keeps flags and extra. Returns the bytes
    /// removed.
    pub fn drain(&mut self, n: usize) -> usize {
        let total = self.data();
        if n >= total {
            self.hdr.clear_blocks();
            return total;
        }

        let mut left = n;
        while left > 0 {
            let Some(head) = self.head_block() else {
                break;
            };
            let size = head.size();
            if size <= left {
                self.remove_head();
                left -= size;
            } else if head.block_type() == BlockType::Data {
                left -= self.cut_data_head(left);
                break;
            } else {
                break;
            }
        }
        n - left
    }

    /// Remove all blocks and clear flags and extra
    pub fn reset(&mut self) {
        self.hdr = HtxHeader::empty();
    }

    /// Pack payloads after the header and renumber blocks from 0
    pub fn defrag(&mut self) {
        if self.is_empty() {
            self.hdr.clear_blocks();
            return;
        }

        let mut addr = HTX_HDR_SIZE;
        let (head, tail) = (self.hdr.head, self.hdr.tail);
        for (i, pos) in (head..=tail).enumerate() {
            let (info, old) = self.read_entry(pos);
            let len = info.size();
            self.buf.area_mut().copy_within(old..old + len, addr);
            self.write_entry(i as u32, info, addr);
            addr += len;
        }

        self.hdr.head = 0;
        self.hdr.tail = tail - head;
        self.hdr.head_addr = HTX_HDR_SIZE as u32;
        self.hdr.tail_addr = addr as u32;
    }
}

impl Drop for Htx<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl fmt::Debug for Htx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Htx")
            .field("size", &self.size())
            .field("data", &self.data())
            .field("nbblks", &self.nbblks())
            .field("flags", &self.hdr.flags)
            .field("extra", &self.extra())
            .finish()
    }
}

/// Iterator over the blocks of a message
pub struct Blocks<'b> {
    htx: &'b Htx<'b>,
    next: u64,
    end: u64,
}

impl<'b> Iterator for Blocks<'b> {
    type Item = Block<'b>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.end {
            return None;
        }
        let blk = self.htx.block(self.next as u32);
        self.next += 1;
        blk
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end + 1).saturating_sub(self.next) as usize;
        (n, Some(n))
    }
}
