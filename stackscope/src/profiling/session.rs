//! Storage of one profiling session
//!
//! Everything the sampling path writes lives here and is allocated up
//! front in [`Session::new`]. A session is frozen (inactive) after stop and
//! kept readable until the next start replaces it.

use stackscope_common::MAX_STACK_FRAMES;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::call_trace_table::CallTraceTable;
use super::method_table::MethodSampleTable;
use super::sample_table::TableConfig;
use super::trace_buffer::CallTraceBuffers;
use crate::config::Arguments;
use crate::domain::{FailureReason, FAILURE_TYPES};

pub struct Session {
    pub args: Arguments,
    /// Snapshot version; bumped on every start
    pub generation: u64,
    pub traces: CallTraceTable,
    pub methods: MethodSampleTable,
    pub buffers: CallTraceBuffers,
    total_samples: AtomicU64,
    total_counter: AtomicU64,
    failures: [AtomicU64; FAILURE_TYPES],
    /// Leaf frames that did not fit the method table
    dropped_methods: AtomicU64,
    active: AtomicBool,
    started: Instant,
    stopped: Mutex<Option<Duration>>,
}

impl Session {
    #[must_use]
    pub fn new(args: Arguments, generation: u64, config: TableConfig) -> Self {
        Self {
            traces: CallTraceTable::new(config, args.frame_buffer_size),
            methods: MethodSampleTable::new(config),
            buffers: CallTraceBuffers::new(
                config.stripes,
                args.max_stack_depth.clamp(1, MAX_STACK_FRAMES),
            ),
            args,
            generation,
            total_samples: AtomicU64::new(0),
            total_counter: AtomicU64::new(0),
            failures: std::array::from_fn(|_| AtomicU64::new(0)),
            dropped_methods: AtomicU64::new(0),
            active: AtomicBool::new(true),
            started: Instant::now(),
            stopped: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Refuse further samples and fix the uptime
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        stopped.get_or_insert(self.started.elapsed());
    }

    /// Count a sample entering the engine, recorded or not
    pub fn count_sample(&self, weight: u64) {
        self.total_samples.fetch_add(1, Ordering::Relaxed);
        self.total_counter.fetch_add(weight, Ordering::Relaxed);
    }

    pub fn count_failure(&self, reason: FailureReason) {
        self.failures[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_dropped_method(&self) {
        self.dropped_methods.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    pub fn total_counter(&self) -> u64 {
        self.total_counter.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> [u64; FAILURE_TYPES] {
        std::array::from_fn(|i| self.failures[i].load(Ordering::Relaxed))
    }

    pub fn failure_count(&self, reason: FailureReason) -> u64 {
        self.failures[reason.index()].load(Ordering::Relaxed)
    }

    pub fn dropped_methods(&self) -> u64 {
        self.dropped_methods.load(Ordering::Relaxed)
    }

    /// Time since start, or the session length once stopped
    pub fn uptime(&self) -> Duration {
        let stopped = *self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        stopped.unwrap_or_else(|| self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let args = Arguments { frame_buffer_size: 128, max_stack_depth: 8, ..Arguments::default() };
        Session::new(args, 1, TableConfig { capacity: 64, ..TableConfig::default() })
    }

    #[test]
    fn test_counters_start_at_zero() {
        let session = session();
        assert_eq!(session.total_samples(), 0);
        assert_eq!(session.failures(), [0; FAILURE_TYPES]);
        assert!(session.is_active());
        assert!(session.traces.is_empty());
    }

    #[test]
    fn test_failure_counting() {
        let session = session();
        session.count_failure(FailureReason::GcActive);
        session.count_failure(FailureReason::GcActive);
        session.count_failure(FailureReason::CollisionOverflow);
        assert_eq!(session.failure_count(FailureReason::GcActive), 2);
        assert_eq!(session.failures()[FailureReason::CollisionOverflow.index()], 1);
    }

    #[test]
    fn test_stack_depth_is_capped() {
        let args = Arguments { max_stack_depth: usize::MAX, ..Arguments::default() };
        let session = Session::new(args, 1, TableConfig { capacity: 8, ..TableConfig::default() });
        let buffer = session.buffers.acquire(crate::domain::Tid(1)).unwrap();
        assert_eq!(buffer.len(), MAX_STACK_FRAMES + crate::profiling::trace_buffer::EXTRA_FRAMES);
    }

    #[test]
    fn test_deactivate_freezes_uptime() {
        let session = session();
        session.deactivate();
        let frozen = session.uptime();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(session.uptime(), frozen);
        assert!(!session.is_active());
    }
}
