//! Segmented growable byte buffer with big-endian cursor semantics.
//!
//! The buffer keeps its storage as a sequence of heap segments and a single
//! position/limit cursor pair, NIO-style. Growing appends a fresh segment
//! instead of copying the bytes written so far, so a half-encoded message is
//! never relocated.

use std::fmt;

/// Error reading or writing past the buffer cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// A read went past the readable limit.
    Underflow { wanted: usize, available: usize },
    /// A write went past the capacity of a non-growable buffer.
    Overflow { wanted: usize, capacity: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Underflow { wanted, available } => {
                write!(f, "buffer underflow: wanted {wanted} bytes, {available} available")
            }
            BufferError::Overflow { wanted, capacity } => {
                write!(f, "buffer overflow: wanted {wanted} bytes, capacity {capacity}")
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// A growable segmented byte buffer.
///
/// All multi-byte integers are big-endian. The cursor discipline follows the
/// classic position/limit model:
///
/// - while filling, `position` is the write cursor and `limit == capacity`;
/// - [`flip`](Buffer::flip) turns a filled buffer into a readable one
///   (`limit` becomes the old write position, `position` rewinds to 0);
/// - [`rewind`](Buffer::rewind) restarts reading without touching `limit`.
pub struct Buffer {
    segments: Vec<Box<[u8]>>,
    capacity: usize,
    position: usize,
    limit: usize,
    growable: bool,
}

impl Buffer {
    /// Allocate a growable buffer with one initial segment.
    pub fn allocate(capacity: usize) -> Self {
        Self::with_growable(capacity, true)
    }

    /// Allocate a fixed-capacity buffer. Writing past `capacity` fails with
    /// [`BufferError::Overflow`].
    pub fn allocate_fixed(capacity: usize) -> Self {
        Self::with_growable(capacity, false)
    }

    fn with_growable(capacity: usize, growable: bool) -> Self {
        let segments = if capacity == 0 {
            Vec::new()
        } else {
            vec![vec![0u8; capacity].into_boxed_slice()]
        };
        Self {
            segments,
            capacity,
            position: 0,
            limit: capacity,
            growable,
        }
    }

    /// Wrap an existing byte vector, ready for reading (`limit == len`).
    pub fn wrap(data: Vec<u8>) -> Self {
        let capacity = data.len();
        Self {
            segments: vec![data.into_boxed_slice()],
            capacity,
            position: 0,
            limit: capacity,
            growable: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left between the cursor and the limit.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Flip from filling to draining: `limit = position`, `position = 0`.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Restart reading from the beginning without touching the limit.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Reset to an empty writable state over the full capacity.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity;
    }

    /// Make room for `additional` bytes at the write cursor.
    ///
    /// On a growable buffer this appends a new segment at least as large as
    /// the current capacity, so total capacity at least doubles and no
    /// existing byte is copied.
    pub fn ensure_capacity(&mut self, additional: usize) -> Result<(), BufferError> {
        let needed = match self.position.checked_add(additional) {
            Some(n) => n,
            None => {
                return Err(BufferError::Overflow {
                    wanted: additional,
                    capacity: self.capacity,
                })
            }
        };
        if needed <= self.capacity {
            if needed > self.limit {
                // Filling mode keeps limit == capacity; a wrapped buffer has
                // limit == capacity too, so this only trips after a flip.
                return Err(BufferError::Overflow {
                    wanted: additional,
                    capacity: self.limit,
                });
            }
            return Ok(());
        }
        if !self.growable {
            return Err(BufferError::Overflow {
                wanted: additional,
                capacity: self.capacity,
            });
        }
        let grow_by = (needed - self.capacity).max(self.capacity.max(16));
        self.segments.push(vec![0u8; grow_by].into_boxed_slice());
        self.capacity += grow_by;
        self.limit = self.capacity;
        Ok(())
    }

    /// Locate the segment and intra-segment offset of an absolute position.
    fn locate(&self, mut offset: usize) -> (usize, usize) {
        for (idx, seg) in self.segments.iter().enumerate() {
            if offset < seg.len() {
                return (idx, offset);
            }
            offset -= seg.len();
        }
        (self.segments.len(), 0)
    }

    /// Append bytes at the write cursor, growing if necessary.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<(), BufferError> {
        if src.is_empty() {
            return Ok(());
        }
        self.ensure_capacity(src.len())?;
        let (mut seg, mut off) = self.locate(self.position);
        let mut rest = src;
        while !rest.is_empty() {
            let dst = &mut self.segments[seg][off..];
            let n = dst.len().min(rest.len());
            dst[..n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            seg += 1;
            off = 0;
        }
        self.position += src.len();
        Ok(())
    }

    /// Read exactly `dst.len()` bytes at the read cursor.
    pub fn get_slice(&mut self, dst: &mut [u8]) -> Result<(), BufferError> {
        if dst.len() > self.remaining() {
            return Err(BufferError::Underflow {
                wanted: dst.len(),
                available: self.remaining(),
            });
        }
        if dst.is_empty() {
            return Ok(());
        }
        let (mut seg, mut off) = self.locate(self.position);
        let total = dst.len();
        let mut rest = dst;
        while !rest.is_empty() {
            let src = &self.segments[seg][off..];
            let n = src.len().min(rest.len());
            rest[..n].copy_from_slice(&src[..n]);
            rest = &mut rest[n..];
            seg += 1;
            off = 0;
        }
        self.position += total;
        Ok(())
    }

    /// Advance the read cursor without looking at the bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), BufferError> {
        if n > self.remaining() {
            return Err(BufferError::Underflow {
                wanted: n,
                available: self.remaining(),
            });
        }
        self.position += n;
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), BufferError> {
        self.put_slice(&v.to_be_bytes())
    }

    pub fn put_i32(&mut self, v: i32) -> Result<(), BufferError> {
        self.put_slice(&v.to_be_bytes())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<(), BufferError> {
        self.put_slice(&v.to_be_bytes())
    }

    pub fn put_i64(&mut self, v: i64) -> Result<(), BufferError> {
        self.put_slice(&v.to_be_bytes())
    }

    pub fn get_u32(&mut self) -> Result<u32, BufferError> {
        let mut b = [0u8; 4];
        self.get_slice(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    pub fn get_i32(&mut self) -> Result<i32, BufferError> {
        let mut b = [0u8; 4];
        self.get_slice(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    pub fn get_u64(&mut self) -> Result<u64, BufferError> {
        let mut b = [0u8; 8];
        self.get_slice(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    pub fn get_i64(&mut self) -> Result<i64, BufferError> {
        let mut b = [0u8; 8];
        self.get_slice(&mut b)?;
        Ok(i64::from_be_bytes(b))
    }

    /// Copy out the readable window (`position..limit`) without consuming it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.remaining()];
        let (mut seg, mut off) = self.locate(self.position);
        let mut filled = 0;
        while filled < out.len() {
            let src = &self.segments[seg][off..];
            let n = src.len().min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&src[..n]);
            filled += n;
            seg += 1;
            off = 0;
        }
        out
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("segments", &self.segments.len())
            .field("capacity", &self.capacity)
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("growable", &self.growable)
            .finish()
    }
}
