//! Deduplicated call traces
//!
//! Each distinct trace (ordered root-to-leaf frame sequence) occupies one
//! slot of a [`SampleTable`]; its frames are copied once into the session's
//! [`FrameBuffer`] on first touch. Repeat traces only bump the slot's
//! sample count and weighted counter.

use stackscope_common::Frame;
use std::sync::atomic::{AtomicU32, Ordering};

use super::frame_buffer::{FrameBuffer, FrameRange};
use super::sample_table::{Entry, MurmurHasher, Outcome, Payload, SampleTable, TableConfig};
use crate::domain::FailureReason;

/// Frame-buffer reference of a trace slot
#[derive(Default)]
pub struct TracePayload {
    start: AtomicU32,
    len: AtomicU32,
}

impl Payload for TracePayload {
    type Value = FrameRange;

    fn store(&self, value: FrameRange) {
        self.start.store(value.start, Ordering::Relaxed);
        self.len.store(value.len, Ordering::Relaxed);
    }

    fn load(&self) -> FrameRange {
        FrameRange {
            start: self.start.load(Ordering::Relaxed),
            len: self.len.load(Ordering::Relaxed),
        }
    }
}

/// Aggregated entry of the call trace table
pub type CallTraceSample = Entry<FrameRange>;

pub struct CallTraceTable {
    table: SampleTable<TracePayload>,
    frames: FrameBuffer,
}

impl CallTraceTable {
    #[must_use]
    pub fn new(config: TableConfig, frame_capacity: usize) -> Self {
        Self { table: SampleTable::new(config), frames: FrameBuffer::with_capacity(frame_capacity) }
    }

    /// Record one occurrence of `frames` with the given weight
    ///
    /// `hash` must be [`hash_call_trace`] of `frames`. A new trace whose
    /// frames no longer fit the frame buffer is dropped as a collision
    /// overflow.
    pub fn record(&self, hash: u64, frames: &[Frame], weight: u64) -> Outcome {
        self.table.record_with(hash, weight, || {
            self.frames.append(frames).map_err(|_| FailureReason::CollisionOverflow)
        })
    }

    /// Occupied slots in slot order
    pub fn samples(&self) -> impl Iterator<Item = CallTraceSample> + '_ {
        self.table.entries()
    }

    /// Frames of a sample, root first
    pub fn frames(&self, sample: &CallTraceSample) -> impl Iterator<Item = Frame> + '_ {
        self.frames.read(sample.value)
    }

    #[must_use]
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Content hash of an ordered frame sequence
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn hash_call_trace(frames: &[Frame]) -> u64 {
    let mut hasher = MurmurHasher::new(frames.len());
    for frame in frames {
        hasher.mix(frame.method);
        hasher.mix(i64::from(frame.location) as u64);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(methods: &[u64]) -> Vec<Frame> {
        methods.iter().map(|&m| Frame::managed(m, 0)).collect()
    }

    #[test]
    fn test_identical_traces_aggregate() {
        let table = CallTraceTable::new(TableConfig::default(), 1024);
        let frames = trace(&[1, 2, 3]);
        let hash = hash_call_trace(&frames);

        for weight in [5, 3, 10] {
            assert!(table.record(hash, &frames, weight).is_recorded());
        }

        let samples: Vec<_> = table.samples().collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].samples, 3);
        assert_eq!(samples[0].counter, 18);
        assert_eq!(table.frames(&samples[0]).collect::<Vec<_>>(), frames);
        // Frames are copied only once
        assert_eq!(table.frame_buffer().used(), 3);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(hash_call_trace(&trace(&[1, 2])), hash_call_trace(&trace(&[2, 1])));
        assert_ne!(
            hash_call_trace(&[Frame::managed(1, 0)]),
            hash_call_trace(&[Frame::managed(1, 4)])
        );
    }

    #[test]
    fn test_frame_buffer_overflow_drops_new_traces_only() {
        let table = CallTraceTable::new(TableConfig::default(), 4);
        let a = trace(&[1, 2, 3]);
        let b = trace(&[4, 5]);
        let hash_a = hash_call_trace(&a);

        assert!(table.record(hash_a, &a, 1).is_recorded());
        assert_eq!(
            table.record(hash_call_trace(&b), &b, 1),
            Outcome::Dropped(FailureReason::CollisionOverflow)
        );
        assert!(table.frame_buffer().overflowed());
        // Duplicates of a stored trace still count
        assert!(table.record(hash_a, &a, 1).is_recorded());
        assert_eq!(table.samples().next().unwrap().samples, 2);
    }
}
