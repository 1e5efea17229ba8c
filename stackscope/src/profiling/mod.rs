//! # Sampling Engine
//!
//! Everything that runs when a sample arrives, plus the storage it writes.
//!
//! ## Sample Flow
//!
//! ```text
//! trigger (timer, alloc hook, lock hook) on any thread
//!     │
//!     ▼
//! Profiler::record_sample
//!     │  try_read session ── busy/stopped ──▶ Inactive
//!     │  borrow scratch buffer (3 slots tried) ── busy ──▶ Dropped(Skipped)
//!     ▼
//! StackWalker::walk ──▶ [thread frame] + frames + [event frame]
//!     │
//!     ▼
//! CallTraceTable::record ── probe bound / frame buffer full ──▶ Dropped(CollisionOverflow)
//!     │
//!     ▼
//! MethodSampleTable::record (leaf frame)
//! ```
//!
//! Nothing on this path blocks, allocates or logs. Locks are `spin` mutexes
//! taken with bounded `try_lock`; a sample that cannot get one is counted
//! and dropped.
//!
//! ## Storage
//!
//! - [`FrameBuffer`]: append-only frame arena, sticky overflow
//! - [`CallTraceTable`]: traces deduplicated by content hash
//! - [`MethodSampleTable`]: samples by leaf frame
//! - [`CallTraceBuffers`]: per-concurrency-slot scratch space
//!
//! All of it is sized from [`Arguments`](crate::config::Arguments) and
//! [`TableConfig`] when a session starts.

pub mod call_trace_table;
pub mod frame_buffer;
pub mod method_table;
pub mod os;
pub mod profiler;
pub mod sample_table;
pub mod session;
pub mod threads;
pub mod trace_buffer;
pub mod walker;

pub use call_trace_table::{hash_call_trace, CallTraceSample, CallTraceTable};
pub use frame_buffer::{FrameBuffer, FrameRange, Overflow};
pub use method_table::{hash_method, MethodSample, MethodSampleTable};
pub use os::current_tid;
pub use profiler::{Profiler, SampleOutcome, State};
pub use sample_table::{Outcome, TableConfig};
pub use session::Session;
pub use threads::{list_threads, ThreadRegistry};
pub use trace_buffer::CallTraceBuffers;
pub use walker::{StackWalker, ThreadStack, ThreadStackWalker};
