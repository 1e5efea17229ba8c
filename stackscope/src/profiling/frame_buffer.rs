//! Append-only store of raw captured frames
//!
//! Capacity is fixed when the session starts. Slots are claimed with a
//! single `fetch_add` on the write index, so concurrent producers never
//! block each other and never cause a reallocation. Once a reservation does
//! not fit, the buffer is marked overflowed for the rest of the session and
//! refuses further writes; frames already stored stay readable.

use stackscope_common::Frame;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

/// Returned by [`FrameBuffer::reserve`] once capacity is exhausted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("frame buffer overflow")]
pub struct Overflow;

/// Location of a trace's frames inside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRange {
    pub start: u32,
    pub len: u32,
}

/// A frame stored as two atomics so disjoint regions can be written from
/// many threads without locking.
#[derive(Default)]
struct FrameCell {
    method: AtomicU64,
    location: AtomicI32,
}

pub struct FrameBuffer {
    cells: Box<[FrameCell]>,
    index: AtomicUsize,
    overflow: AtomicBool,
}

impl FrameBuffer {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        // Offsets are stored as u32 in trace slots
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            cells: (0..capacity).map(|_| FrameCell::default()).collect(),
            index: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
        }
    }

    /// Claim `n` contiguous slots and return the first offset
    ///
    /// # Errors
    /// Returns [`Overflow`] if the buffer has overflowed or the claim does
    /// not fit; the overflow is sticky.
    pub fn reserve(&self, n: usize) -> Result<usize, Overflow> {
        if self.overflow.load(Ordering::Relaxed) {
            return Err(Overflow);
        }
        let start = self.index.fetch_add(n, Ordering::Relaxed);
        if start.saturating_add(n) > self.cells.len() {
            self.overflow.store(true, Ordering::Relaxed);
            return Err(Overflow);
        }
        Ok(start)
    }

    /// Copy frames into a region previously returned by [`reserve`](Self::reserve)
    pub fn write(&self, offset: usize, frames: &[Frame]) {
        for (cell, frame) in self.cells[offset..offset + frames.len()].iter().zip(frames) {
            cell.method.store(frame.method, Ordering::Relaxed);
            cell.location.store(frame.location, Ordering::Relaxed);
        }
    }

    /// Reserve and write in one step
    ///
    /// # Errors
    /// Returns [`Overflow`] when the frames do not fit.
    #[allow(clippy::cast_possible_truncation)] // capacity is clamped to u32
    pub fn append(&self, frames: &[Frame]) -> Result<FrameRange, Overflow> {
        let offset = self.reserve(frames.len())?;
        self.write(offset, frames);
        Ok(FrameRange { start: offset as u32, len: frames.len() as u32 })
    }

    /// Frames stored in `range`, root first
    pub fn read(&self, range: FrameRange) -> impl Iterator<Item = Frame> + '_ {
        let start = range.start as usize;
        let end = (start + range.len as usize).min(self.cells.len());
        self.cells[start.min(end)..end].iter().map(|cell| Frame {
            method: cell.method.load(Ordering::Relaxed),
            location: cell.location.load(Ordering::Relaxed),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Number of slots handed out (never more than capacity)
    #[must_use]
    pub fn used(&self) -> usize {
        self.index.load(Ordering::Relaxed).min(self.cells.len())
    }

    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u64) -> Vec<Frame> {
        (1..=n).map(|m| Frame::managed(m, 0)).collect()
    }

    #[test]
    fn test_append_and_read_back() {
        let buffer = FrameBuffer::with_capacity(16);
        let a = buffer.append(&frames(3)).unwrap();
        let b = buffer.append(&frames(2)).unwrap();

        assert_eq!(a, FrameRange { start: 0, len: 3 });
        assert_eq!(b, FrameRange { start: 3, len: 2 });
        assert_eq!(buffer.read(a).collect::<Vec<_>>(), frames(3));
        assert_eq!(buffer.used(), 5);
    }

    #[test]
    fn test_overflow_is_sticky() {
        let buffer = FrameBuffer::with_capacity(4);
        let kept = buffer.append(&frames(3)).unwrap();

        assert_eq!(buffer.append(&frames(2)), Err(Overflow));
        assert!(buffer.overflowed());
        // A claim that would have fit is still refused
        assert_eq!(buffer.reserve(1), Err(Overflow));
        assert_eq!(buffer.read(kept).count(), 3);
        assert_eq!(buffer.used(), 4);
    }
}
