//! # Shared Data Structures (Stack Walker ↔ Sampling Engine)
//!
//! Defines the frame layout and constants shared between the native
//! stack-walking collaborator and the sampling engine. `Frame` is
//! `#[repr(C)]` so a walker written against the raw layout can fill the
//! engine's scratch buffers directly.
//!
//! ## Location Sentinels
//!
//! A frame's `location` is either a non-negative position inside a method
//! (bytecode index) or a negative sentinel code:
//!
//! - `-1 ..= -11` - capture failures reported by the walker
//!   (see [`TICKS_NO_MANAGED_FRAME`] through [`TICKS_SKIPPED`])
//! - [`LOCATION_NATIVE`] - `method` holds a native program counter
//! - [`LOCATION_THREAD`] - `method` holds a thread id
//! - [`LOCATION_EVENT`] - `method` holds an event subject (allocated class, lock class)
//!
//! Unrecognised negative codes are tolerated by the engine and counted as an
//! unknown walker state.

#![no_std]

// ============================================================================
// Capacity Constants
// ============================================================================

/// Default number of slots in the call trace and method sample tables.
pub const MAX_CALLTRACES: usize = 65536;

/// Default maximum stack depth captured per sample.
pub const MAX_STACK_FRAMES: usize = 2048;

/// Maximum number of native libraries tracked per process.
pub const MAX_NATIVE_LIBS: usize = 2048;

/// Number of spin-lock stripes and scratch buffers.
///
/// Bounds how many samples can be captured concurrently; a sample arriving
/// while every slot it may use is busy is dropped as skipped.
pub const CONCURRENCY_LEVEL: usize = 16;

/// Maximum number of slots probed past the home slot before a trace is
/// dropped as a collision overflow.
pub const MAX_PROBE_DISTANCE: usize = 64;

/// Default sampling interval in nanoseconds (10 ms).
pub const DEFAULT_INTERVAL: u64 = 10_000_000;

/// Default frame buffer capacity in frames.
pub const DEFAULT_FRAMEBUF: usize = 1_000_000;

// ============================================================================
// Failure Sentinels
// ============================================================================
//
// Relative to the JVM's AsyncGetCallTrace `ticks_*` codes, -1 ..= -6 are
// shifted down by one so that no code is 0 (`ticks_no_Java_frame` is 0
// there), and `ticks_not_walkable_Java` / `ticks_not_walkable_not_Java`
// share `TICKS_NOT_WALKABLE`. -7 ..= -11 keep their AsyncGetCallTrace values.

/// No managed frame on the stack
pub const TICKS_NO_MANAGED_FRAME: i32 = -1;
/// Class of the executing method is not loaded yet
pub const TICKS_NO_CLASS_LOAD: i32 = -2;
/// Garbage collector is active
pub const TICKS_GC_ACTIVE: i32 = -3;
/// Thread is in an unknown non-managed state
pub const TICKS_UNKNOWN_NOT_MANAGED: i32 = -4;
/// Stack cannot be walked
pub const TICKS_NOT_WALKABLE: i32 = -5;
/// Thread is in an unknown managed state
pub const TICKS_UNKNOWN_MANAGED: i32 = -6;
/// Thread state could not be determined
pub const TICKS_UNKNOWN_STATE: i32 = -7;
/// Thread is exiting
pub const TICKS_THREAD_EXIT: i32 = -8;
/// Deoptimization in progress
pub const TICKS_DEOPT: i32 = -9;
/// Thread is at a safepoint
pub const TICKS_SAFEPOINT: i32 = -10;
/// Sample was skipped by the walker or the engine
pub const TICKS_SKIPPED: i32 = -11;

// ============================================================================
// Frame Kind Sentinels
// ============================================================================

/// `method` holds a native program counter.
pub const LOCATION_NATIVE: i32 = -20;

/// `method` holds a thread id (thread annotation frame).
pub const LOCATION_THREAD: i32 = -21;

/// `method` holds an event subject id (allocated class, contended lock class).
pub const LOCATION_EVENT: i32 = -22;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One captured stack level.
///
/// **Memory Layout**: `#[repr(C)]`, 16 bytes with padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Method identity, or the payload selected by a negative `location`.
    pub method: u64,

    /// Position within the method (`>= 0`) or a sentinel code (`< 0`).
    pub location: i32,
}

impl Frame {
    /// A managed (interpreted or compiled) method frame.
    #[must_use]
    pub const fn managed(method: u64, location: i32) -> Self {
        Self { method, location }
    }

    /// A native frame identified by its program counter.
    #[must_use]
    pub const fn native(pc: u64) -> Self {
        Self { method: pc, location: LOCATION_NATIVE }
    }

    /// A thread annotation frame.
    #[must_use]
    pub const fn thread(tid: u32) -> Self {
        Self { method: tid as u64, location: LOCATION_THREAD }
    }

    /// An event subject frame.
    #[must_use]
    pub const fn event(subject: u64) -> Self {
        Self { method: subject, location: LOCATION_EVENT }
    }

    /// A capture failure frame carrying one of the `TICKS_*` codes.
    #[must_use]
    pub const fn failure(code: i32) -> Self {
        Self { method: 0, location: code }
    }

    /// Returns true if `location` is a sentinel rather than a position.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.location < 0
    }
}
