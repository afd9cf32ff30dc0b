//! Growable byte streams used for all TCP framing
//!
//! A `StreamBuffer` owns a byte array with a write cursor (`end`) and a
//! read cursor (`p`). Capacity only ever grows; resetting rewinds both
//! cursors without giving memory back.

use bytes::Buf;
use std::fmt;

/// Growable byte buffer with independent read and write cursors
///
/// Reading is done through the `bytes::Buf` implementation, which advances
/// the read cursor; writing appends at the write cursor and grows the
/// buffer when needed.
#[derive(Default)]
pub struct StreamBuffer {
    data: Vec<u8>,
    p: usize,
    end: usize,
}

impl StreamBuffer {
    /// Create an empty stream with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        StreamBuffer {
            data: vec![0; capacity],
            p: 0,
            end: 0,
        }
    }

    /// Allocated size in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.end
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Current read cursor offset
    pub fn position(&self) -> usize {
        self.p
    }

    /// All written bytes, from the start of the buffer
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.end]
    }

    /// Written bytes not yet consumed by the read cursor
    pub fn unread(&self) -> &[u8] {
        &self.data[self.p..self.end]
    }

    /// Rewind both cursors, keeping the allocation
    pub fn reset(&mut self) {
        self.p = 0;
        self.end = 0;
    }

    /// Grow to at least `min_capacity` bytes
    ///
    /// Written bytes and both cursor offsets survive the reallocation.
    /// Never shrinks.
    pub fn grow(&mut self, min_capacity: usize) {
        if min_capacity > self.data.len() {
            self.data.resize(min_capacity, 0);
        }
    }

    /// Make room for `additional` bytes past the write cursor
    pub fn reserve(&mut self, additional: usize) {
        self.grow(self.end + additional);
    }

    /// Append bytes at the write cursor
    pub fn put_slice(&mut self, src: &[u8]) {
        self.reserve(src.len());
        self.data[self.end..self.end + src.len()].copy_from_slice(src);
        self.end += src.len();
    }

    pub fn put_u8(&mut self, value: u8) {
        self.put_slice(&[value]);
    }

    pub fn put_u16_le(&mut self, value: u16) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_u16_be(&mut self, value: u16) {
        self.put_slice(&value.to_be_bytes());
    }

    pub fn put_u32_le(&mut self, value: u32) {
        self.put_slice(&value.to_le_bytes());
    }

    pub fn put_u32_be(&mut self, value: u32) {
        self.put_slice(&value.to_be_bytes());
    }

    /// Writable window of `len` bytes past the write cursor
    ///
    /// The caller must have reserved the space.
    pub(crate) fn spare_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.data[self.end..self.end + len]
    }

    /// Move the write cursor over `n` bytes filled through `spare_mut`
    pub(crate) fn commit(&mut self, n: usize) {
        debug_assert!(self.end + n <= self.data.len());
        self.end += n;
    }

    /// Drop the allocation entirely
    pub(crate) fn release(&mut self) {
        self.data = Vec::new();
        self.reset();
    }
}

impl Buf for StreamBuffer {
    fn remaining(&self) -> usize {
        self.end - self.p
    }

    fn chunk(&self) -> &[u8] {
        &self.data[self.p..self.end]
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.remaining(),
            "cannot advance past write cursor: {} > {}",
            cnt,
            self.remaining()
        );
        self.p += cnt;
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("capacity", &self.data.len())
            .field("p", &self.p)
            .field("end", &self.end)
            .finish()
    }
}
