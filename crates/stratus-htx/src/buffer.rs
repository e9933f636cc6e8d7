//! Raw fixed-capacity buffers
//!
//! A buffer is a zero-initialised area of fixed size plus the count of
//! bytes in use. It is either filled with raw bytes from the front or
//! overlaid by an [`Htx`](crate::Htx) view, never both at once.

use std::mem;

use bytes::BytesMut;

/// Fixed-capacity byte area
#[derive(Clone, PartialEq, Eq)]
pub struct Buffer {
    area: BytesMut,
    data: usize,
}

impl Buffer {
    /// Allocate a zeroed buffer of `size` bytes
    pub fn new(size: usize) -> Self {
        Buffer {
            area: BytesMut::zeroed(size),
            data: 0,
        }
    }

    /// The unallocated buffer
    pub fn null() -> Self {
        Buffer {
            area: BytesMut::new(),
            data: 0,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.area.is_empty()
    }

    /// Capacity in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.area.len()
    }

    /// Bytes in use
    #[inline]
    pub fn data(&self) -> usize {
        self.data
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data == 0
    }

    /// Bytes still available
    #[inline]
    pub fn room(&self) -> usize {
        self.size() - self.data
    }

    /// Bytes in use
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.area[..self.data]
    }

    /// Append raw bytes, as many as fit. Returns how many were copied.
    pub fn put_slice(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.room());
        self.area[self.data..self.data + n].copy_from_slice(&src[..n]);
        self.data += n;
        n
    }

    /// Forget the content, keep the area
    #[inline]
    pub fn reset(&mut self) {
        self.data = 0;
    }

    /// Move up to `count` bytes from `src` to the end of `self`.
    ///
    /// When `self` is empty, all of `src` is requested and both areas have
    /// the same size, the areas are swapped instead of copied. Returns the
    /// number of bytes moved.
    pub fn xfer(&mut self, src: &mut Buffer, count: usize) -> usize {
        let count = count.min(src.data);
        if count == 0 {
            return 0;
        }

        if self.data == 0 && count == src.data && self.size() == src.size() {
            mem::swap(self, src);
            src.data = 0;
            return count;
        }

        let n = self.put_slice(&src.area[..count]);
        src.area.copy_within(n..src.data, 0);
        src.data -= n;
        n
    }

    #[inline]
    pub(crate) fn area(&self) -> &[u8] {
        &self.area
    }

    #[inline]
    pub(crate) fn area_mut(&mut self) -> &mut [u8] {
        &mut self.area
    }

    #[inline]
    pub(crate) fn set_data(&mut self, data: usize) {
        debug_assert!(data <= self.size());
        self.data = data;
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::null()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({}/{})", self.data, self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_buffer() {
        let buf = Buffer::null();
        assert!(buf.is_null());
        assert!(buf.is_empty());
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.room(), 0);
    }

    #[test]
    fn test_put_slice_truncates() {
        let mut buf = Buffer::new(4);
        assert_eq!(buf.put_slice(b"abcdef"), 4);
        assert_eq!(buf.as_slice(), b"abcd");
        assert_eq!(buf.room(), 0);
        assert_eq!(buf.put_slice(b"x"), 0);
    }

    #[test]
    fn test_xfer_swaps_when_empty() {
        let mut src = Buffer::new(16);
        src.put_slice(b"hello");
        let mut dst = Buffer::new(16);

        assert_eq!(dst.xfer(&mut src, 100), 5);
        assert_eq!(dst.as_slice(), b"hello");
        assert!(src.is_empty());
        assert_eq!(src.size(), 16);
    }

    #[test]
    fn test_xfer_copies_partial() {
        let mut src = Buffer::new(16);
        src.put_slice(b"hello world");
        let mut dst = Buffer::new(16);
        dst.put_slice(b">");

        assert_eq!(dst.xfer(&mut src, 5), 5);
        assert_eq!(dst.as_slice(), b">hello");
        assert_eq!(src.as_slice(), b" world");
    }

    #[test]
    fn test_xfer_limited_by_room() {
        let mut src = Buffer::new(16);
        src.put_slice(b"0123456789");
        let mut dst = Buffer::new(4);

        assert_eq!(dst.xfer(&mut src, 10), 4);
        assert_eq!(dst.as_slice(), b"0123");
        assert_eq!(src.as_slice(), b"456789");
    }
}
