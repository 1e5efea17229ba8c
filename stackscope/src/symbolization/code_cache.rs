//! Address-interval caches for compiled code
//!
//! A cache is a sorted list of non-overlapping `[start, end)` regions, each
//! tagged with a symbol. Mutations (runtime notifications) take the write
//! lock; lookups come from the sampling path and only ever `try_read`, so a
//! lookup racing a mutation reports `None` instead of waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, TryLockError};

/// A contiguous code region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlob<S> {
    pub start: u64,
    pub end: u64,
    pub symbol: S,
}

impl<S> CodeBlob<S> {
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

pub struct CodeCache<S> {
    blobs: RwLock<Vec<CodeBlob<S>>>,
    /// Lowest start ever added; regions are not shrunk on removal
    min_address: AtomicU64,
    /// Highest end ever added
    max_address: AtomicU64,
}

impl<S: Clone + PartialEq> CodeCache<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(Vec::new()),
            min_address: AtomicU64::new(u64::MAX),
            max_address: AtomicU64::new(0),
        }
    }

    /// Build a cache from regions in any order
    ///
    /// Overlapping regions are resolved in favour of the later one.
    #[must_use]
    pub fn from_blobs(blobs: impl IntoIterator<Item = CodeBlob<S>>) -> Self {
        let cache = Self::new();
        for blob in blobs {
            cache.insert(blob);
        }
        cache
    }

    /// Add `[start, start + length)`, evicting stale regions it overlaps
    pub fn add(&self, start: u64, length: u64, symbol: S) {
        if length == 0 {
            return;
        }
        self.insert(CodeBlob { start, end: start.saturating_add(length), symbol });
    }

    fn insert(&self, blob: CodeBlob<S>) {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);

        // First region ending after the new start; everything from there
        // that starts before the new end overlaps.
        let first = blobs.partition_point(|b| b.end <= blob.start);
        let last = first + blobs[first..].partition_point(|b| b.start < blob.end);
        if last > first {
            log::debug!(
                "Evicting {} stale code region(s) overlapping 0x{:x}-0x{:x}",
                last - first,
                blob.start,
                blob.end
            );
        }

        self.min_address.fetch_min(blob.start, Ordering::Relaxed);
        self.max_address.fetch_max(blob.end, Ordering::Relaxed);
        blobs.splice(first..last, std::iter::once(blob));
    }

    /// Remove the region starting at `start` tagged with `symbol`
    ///
    /// Returns false if no such region exists.
    pub fn remove(&self, start: u64, symbol: &S) -> bool {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        match blobs.binary_search_by_key(&start, |b| b.start) {
            Ok(index) if blobs[index].symbol == *symbol => {
                blobs.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Resolve `addr` to the symbol of the region containing it
    ///
    /// Never blocks: returns `None` when the address is unknown or when a
    /// mutation currently holds the cache.
    pub fn lookup(&self, addr: u64) -> Option<S> {
        if !self.in_bounds(addr) {
            return None;
        }
        let blobs = match self.blobs.try_read() {
            Ok(blobs) => blobs,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        let index = blobs.partition_point(|b| b.end <= addr);
        blobs.get(index).filter(|b| b.contains(addr)).map(|b| b.symbol.clone())
    }

    /// Fast check against the overall bounds of every region ever added
    pub fn in_bounds(&self, addr: u64) -> bool {
        addr >= self.min_address.load(Ordering::Relaxed)
            && addr < self.max_address.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Clone + PartialEq> Default for CodeCache<S> {
    fn default() -> Self {
        Self::new()
    }
}
