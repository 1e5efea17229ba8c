//! Flat profile: samples aggregated by leaf frame only

use stackscope_common::Frame;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use super::sample_table::{Entry, MurmurHasher, Outcome, Payload, SampleTable, TableConfig};

#[derive(Default)]
pub struct MethodPayload {
    method: AtomicU64,
    location: AtomicI32,
}

impl Payload for MethodPayload {
    type Value = Frame;

    fn store(&self, value: Frame) {
        self.method.store(value.method, Ordering::Relaxed);
        self.location.store(value.location, Ordering::Relaxed);
    }

    fn load(&self) -> Frame {
        Frame {
            method: self.method.load(Ordering::Relaxed),
            location: self.location.load(Ordering::Relaxed),
        }
    }
}

/// Aggregated entry of the method sample table
pub type MethodSample = Entry<Frame>;

pub struct MethodSampleTable {
    table: SampleTable<MethodPayload>,
}

impl MethodSampleTable {
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        Self { table: SampleTable::new(config) }
    }

    pub fn record(&self, leaf: Frame, weight: u64) -> Outcome {
        self.table.record_with(hash_method(&leaf), weight, || Ok(leaf))
    }

    pub fn samples(&self) -> impl Iterator<Item = MethodSample> + '_ {
        self.table.entries()
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

/// Hash of (method identity, location)
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn hash_method(frame: &Frame) -> u64 {
    let mut hasher = MurmurHasher::new(1);
    hasher.mix(frame.method);
    hasher.mix(i64::from(frame.location) as u64);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregates_by_method_and_location() {
        let table = MethodSampleTable::new(TableConfig::default());
        table.record(Frame::managed(7, 1), 10);
        table.record(Frame::managed(7, 1), 5);
        table.record(Frame::managed(7, 2), 1);

        let mut samples: Vec<_> = table.samples().collect();
        samples.sort_by_key(|s| s.sequence);
        assert_eq!(samples.len(), 2);
        assert_eq!((samples[0].value, samples[0].samples, samples[0].counter), (Frame::managed(7, 1), 2, 15));
        assert_eq!((samples[1].value, samples[1].samples), (Frame::managed(7, 2), 1));
    }
}
