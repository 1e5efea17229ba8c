//! Stack-walking collaborator interface
//!
//! The engine does not know how to unwind a thread; a [`StackWalker`] turns
//! an interrupted execution context into frames. Failure conditions are
//! reported in-band as a leaf frame carrying one of the `TICKS_*` codes of
//! `stackscope_common`.

use stackscope_common::Frame;

pub trait StackWalker: Send + Sync {
    /// Interrupted execution state handed over by the sample trigger
    type Context: ?Sized;

    /// Write at most `out.len()` frames, root first, and return the count
    ///
    /// Called on the sampling path: must not block or allocate.
    fn walk(&self, context: &Self::Context, out: &mut [Frame]) -> usize;

    /// Program counter at the point of interruption, if known
    ///
    /// Used to recover the top frame when the walker could not identify it.
    fn interrupted_pc(&self, _context: &Self::Context) -> Option<u64> {
        None
    }
}

/// Stack state already captured by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadStack {
    /// Frames root first
    pub frames: Vec<Frame>,
    pub pc: Option<u64>,
}

impl ThreadStack {
    #[must_use]
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, pc: None }
    }

    #[must_use]
    pub fn with_pc(mut self, pc: u64) -> Self {
        self.pc = Some(pc);
        self
    }
}

/// Walker for stacks that are handed over already materialized
///
/// Deep stacks are truncated at the root: the leaf-most frames are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStackWalker;

impl StackWalker for ThreadStackWalker {
    type Context = ThreadStack;

    fn walk(&self, context: &ThreadStack, out: &mut [Frame]) -> usize {
        let frames = &context.frames;
        let skip = frames.len().saturating_sub(out.len());
        let kept = &frames[skip..];
        out[..kept.len()].copy_from_slice(kept);
        kept.len()
    }

    fn interrupted_pc(&self, context: &ThreadStack) -> Option<u64> {
        context.pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_copies_all_frames_when_they_fit() {
        let stack = ThreadStack::new(vec![Frame::managed(1, 0), Frame::managed(2, 3)]);
        let mut out = [Frame::default(); 4];
        assert_eq!(ThreadStackWalker.walk(&stack, &mut out), 2);
        assert_eq!(&out[..2], &stack.frames[..]);
    }

    #[test]
    fn test_walk_keeps_leaf_frames_when_truncating() {
        let stack = ThreadStack::new((1..=5).map(|m| Frame::managed(m, 0)).collect());
        let mut out = [Frame::default(); 2];
        assert_eq!(ThreadStackWalker.walk(&stack, &mut out), 2);
        assert_eq!(out, [Frame::managed(4, 0), Frame::managed(5, 0)]);
    }

    #[test]
    fn test_interrupted_pc() {
        let stack = ThreadStack::default().with_pc(0x4000);
        assert_eq!(ThreadStackWalker.interrupted_pc(&stack), Some(0x4000));
    }
}
