//! Per-concurrency-slot scratch buffers for in-flight captures
//!
//! A capture needs room for the walked frames plus the thread frame and the
//! event frame. Buffers are allocated once per session; a sampling thread
//! borrows one with `try_lock` and never waits for it.

use spin::{Mutex, MutexGuard};
use stackscope_common::Frame;

use crate::domain::Tid;

/// Consecutive slots tried before a sample is skipped
const SLOT_ATTEMPTS: usize = 3;

/// Frames reserved around the walked stack (thread root, event leaf)
pub const EXTRA_FRAMES: usize = 2;

pub struct CallTraceBuffers {
    slots: Box<[Mutex<Box<[Frame]>>]>,
}

impl CallTraceBuffers {
    /// `count` buffers, each able to hold `max_depth` walked frames
    #[must_use]
    pub fn new(count: usize, max_depth: usize) -> Self {
        let len = max_depth + EXTRA_FRAMES;
        Self {
            slots: (0..count.max(1))
                .map(|_| Mutex::new(vec![Frame::default(); len].into_boxed_slice()))
                .collect(),
        }
    }

    /// Borrow a free buffer for a capture on thread `tid`
    ///
    /// Starts at the thread's home slot and tries the next two; returns
    /// `None` if all of them are busy.
    pub fn acquire(&self, tid: Tid) -> Option<MutexGuard<'_, Box<[Frame]>>> {
        let home = lock_index(tid, self.slots.len());
        (0..SLOT_ATTEMPTS.min(self.slots.len()))
            .find_map(|i| self.slots[(home + i) % self.slots.len()].try_lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn lock_index(tid: Tid, slots: usize) -> usize {
    let mut h = tid.0;
    h ^= h >> 8;
    h ^= h >> 4;
    h as usize % slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_has_room_for_extra_frames() {
        let buffers = CallTraceBuffers::new(4, 16);
        let guard = buffers.acquire(Tid(1)).unwrap();
        assert_eq!(guard.len(), 16 + EXTRA_FRAMES);
    }

    #[test]
    fn test_busy_slots_fall_through_then_skip() {
        let buffers = CallTraceBuffers::new(16, 4);
        let tid = Tid(5);
        let first = buffers.acquire(tid).unwrap();
        let second = buffers.acquire(tid).unwrap();
        let third = buffers.acquire(tid).unwrap();
        assert!(buffers.acquire(tid).is_none());

        drop(second);
        assert!(buffers.acquire(tid).is_some());
        drop(first);
        drop(third);
    }

    #[test]
    fn test_lock_index_spreads_threads() {
        let slots: std::collections::HashSet<_> =
            (1000..1064).map(|tid| lock_index(Tid(tid), 16)).collect();
        assert!(slots.len() > 8);
    }
}
