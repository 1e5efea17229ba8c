//! Fixed-capacity, striped aggregation table
//!
//! Shared core of [`CallTraceTable`](super::CallTraceTable) and
//! [`MethodSampleTable`](super::MethodSampleTable). Entries are keyed by a
//! 64-bit content hash and never move once claimed.
//!
//! ## Insertion
//!
//! ```text
//! home = hash % capacity
//! for slot in home, home+1, ... (at most probe_limit slots, wrapping):
//!     slot.hash == hash  → atomic add samples/counter      (lock-free)
//!     slot.hash != 0     → occupied by another trace, probe on
//!     slot.hash == 0     → take stripe[slot % stripes] (bounded spin),
//!                          re-check, fill payload, publish hash
//! no slot found          → Dropped(CollisionOverflow)
//! ```
//!
//! A slot's hash is written once, with `Release`, after its payload and
//! initial counts. Readers that observe the hash with `Acquire` therefore
//! see a complete entry.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::FailureReason;

/// Default number of stripe acquisition attempts on the sampling path
pub const DEFAULT_SPIN_LIMIT: u32 = 128;

/// Result of recording into a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stored or merged into the slot at this index
    Recorded(usize),
    /// Not stored; the reason has to be counted by the caller
    Dropped(FailureReason),
}

impl Outcome {
    #[must_use]
    pub fn is_recorded(self) -> bool {
        matches!(self, Outcome::Recorded(_))
    }
}

/// Table dimensions, fixed for the life of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    pub capacity: usize,
    pub stripes: usize,
    pub probe_limit: usize,
    pub spin_limit: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: stackscope_common::MAX_CALLTRACES,
            stripes: stackscope_common::CONCURRENCY_LEVEL,
            probe_limit: stackscope_common::MAX_PROBE_DISTANCE,
            spin_limit: DEFAULT_SPIN_LIMIT,
        }
    }
}

/// Per-entry data stored next to the counts, written once on first touch
pub trait Payload: Default + Send + Sync {
    type Value: Copy;

    fn store(&self, value: Self::Value);
    fn load(&self) -> Self::Value;
}

#[derive(Default)]
struct Slot<P> {
    hash: AtomicU64,
    samples: AtomicU64,
    counter: AtomicU64,
    /// First-touch order, used to break ties in reports
    sequence: AtomicU64,
    payload: P,
}

/// Consistent copy of one occupied slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<V> {
    pub slot: usize,
    pub hash: u64,
    pub samples: u64,
    pub counter: u64,
    pub sequence: u64,
    pub value: V,
}

pub struct SampleTable<P: Payload> {
    slots: Box<[Slot<P>]>,
    stripes: Box<[spin::Mutex<()>]>,
    probe_limit: usize,
    spin_limit: u32,
    next_sequence: AtomicU64,
}

impl<P: Payload> SampleTable<P> {
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
            stripes: (0..config.stripes.max(1)).map(|_| spin::Mutex::new(())).collect(),
            probe_limit: config.probe_limit.clamp(1, capacity),
            spin_limit: config.spin_limit,
            next_sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Record one sample under `hash`
    ///
    /// `init` runs at most once, only when an empty slot is claimed for a
    /// new key, while that slot's stripe lock is held. If it fails the slot
    /// stays empty and the sample is dropped with the returned reason.
    pub fn record_with<F>(&self, hash: u64, weight: u64, init: F) -> Outcome
    where
        F: FnOnce() -> Result<P::Value, FailureReason>,
    {
        let hash = if hash == 0 { 1 } else { hash };
        let capacity = self.slots.len();
        #[allow(clippy::cast_possible_truncation)] // remainder < capacity
        let home = (hash % capacity as u64) as usize;
        let mut init = Some(init);

        for step in 0..self.probe_limit {
            let index = (home + step) % capacity;
            let slot = &self.slots[index];

            match slot.hash.load(Ordering::Acquire) {
                current if current == hash => {
                    slot.add(weight);
                    return Outcome::Recorded(index);
                }
                0 => {}
                _ => continue,
            }

            let stripe = &self.stripes[index % self.stripes.len()];
            let Some(_stripe) = (0..self.spin_limit.max(1)).find_map(|_| {
                let guard = stripe.try_lock();
                if guard.is_none() {
                    std::hint::spin_loop();
                }
                guard
            }) else {
                return Outcome::Dropped(FailureReason::Skipped);
            };

            // Another writer may have claimed the slot before we got the stripe
            match slot.hash.load(Ordering::Acquire) {
                current if current == hash => {
                    slot.add(weight);
                    return Outcome::Recorded(index);
                }
                0 => {}
                _ => continue,
            }

            let Some(init) = init.take() else {
                return Outcome::Dropped(FailureReason::CollisionOverflow);
            };
            let value = match init() {
                Ok(value) => value,
                Err(reason) => return Outcome::Dropped(reason),
            };
            slot.payload.store(value);
            slot.sequence.store(self.next_sequence.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
            slot.samples.store(1, Ordering::Relaxed);
            slot.counter.store(weight, Ordering::Relaxed);
            slot.hash.store(hash, Ordering::Release);
            return Outcome::Recorded(index);
        }

        Outcome::Dropped(FailureReason::CollisionOverflow)
    }

    /// Occupied slots in slot order
    pub fn entries(&self) -> impl Iterator<Item = Entry<P::Value>> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let hash = slot.hash.load(Ordering::Acquire);
            (hash != 0).then(|| Entry {
                slot: index,
                hash,
                samples: slot.samples.load(Ordering::Relaxed),
                counter: slot.counter.load(Ordering::Relaxed),
                sequence: slot.sequence.load(Ordering::Relaxed),
                value: slot.payload.load(),
            })
        })
    }

    /// Number of occupied slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.hash.load(Ordering::Relaxed) != 0).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P> Slot<P> {
    fn add(&self, weight: u64) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.counter.fetch_add(weight, Ordering::Relaxed);
    }
}

/// Hash helper shared by both tables (64-bit MurmurHash2 mixing)
pub(crate) struct MurmurHasher {
    h: u64,
}

impl MurmurHasher {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    pub(crate) fn new(len: usize) -> Self {
        Self { h: (len as u64).wrapping_mul(Self::M) }
    }

    pub(crate) fn mix(&mut self, value: u64) {
        let mut k = value.wrapping_mul(Self::M);
        k ^= k >> Self::R;
        k = k.wrapping_mul(Self::M);
        self.h ^= k;
        self.h = self.h.wrapping_mul(Self::M);
    }

    pub(crate) fn finish(mut self) -> u64 {
        self.h ^= self.h >> Self::R;
        self.h = self.h.wrapping_mul(Self::M);
        self.h ^= self.h >> Self::R;
        self.h
    }
}
