//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a thread id where
//! a method identity is expected, and make function signatures more
//! expressive.

use serde::{Deserialize, Serialize};
use stackscope_common::{
    Frame, LOCATION_EVENT, LOCATION_NATIVE, LOCATION_THREAD, TICKS_DEOPT, TICKS_GC_ACTIVE,
    TICKS_NOT_WALKABLE, TICKS_NO_CLASS_LOAD, TICKS_NO_MANAGED_FRAME, TICKS_SAFEPOINT,
    TICKS_SKIPPED, TICKS_THREAD_EXIT, TICKS_UNKNOWN_MANAGED, TICKS_UNKNOWN_NOT_MANAGED,
    TICKS_UNKNOWN_STATE,
};
use std::fmt;
use std::str::FromStr;

use super::errors::ConfigError;

/// Method identity assigned by the managed runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId(pub u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method@0x{:x}", self.0)
    }
}

/// Thread ID
///
/// The kernel-assigned id of an application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Kind of event that triggers a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// CPU time sampling (perf events)
    #[default]
    Cpu,
    /// Allocation sampling, weight is allocated bytes
    Alloc,
    /// Lock contention, weight is time spent waiting
    Lock,
    /// Wall-clock sampling of all threads
    Wall,
    /// Interval timer (`setitimer`) sampling
    Itimer,
}

impl EventKind {
    pub const ALL: [EventKind; 5] =
        [EventKind::Cpu, EventKind::Alloc, EventKind::Lock, EventKind::Wall, EventKind::Itimer];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Cpu => "cpu",
            EventKind::Alloc => "alloc",
            EventKind::Lock => "lock",
            EventKind::Wall => "wall",
            EventKind::Itimer => "itimer",
        }
    }

    /// Unit of the weighted counter for this event
    #[must_use]
    pub fn units(self) -> &'static str {
        match self {
            EventKind::Alloc => "bytes",
            _ => "ns",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownEvent(s.to_string()))
    }
}

/// Reason a sample could not be captured or stored.
///
/// The first eleven reasons come from the stack-walking collaborator as
/// negative location codes. `CollisionOverflow` is raised by the engine when
/// a trace cannot be stored (probe bound exhausted, table full, frame buffer
/// overflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureReason {
    NoManagedFrame,
    ClassNotLoaded,
    GcActive,
    UnknownNotManaged,
    NotWalkable,
    UnknownManaged,
    UnknownState,
    ThreadExit,
    Deoptimization,
    Safepoint,
    Skipped,
    CollisionOverflow,
}

/// Number of failure categories tracked per session
pub const FAILURE_TYPES: usize = 12;

impl FailureReason {
    pub const ALL: [FailureReason; FAILURE_TYPES] = [
        FailureReason::NoManagedFrame,
        FailureReason::ClassNotLoaded,
        FailureReason::GcActive,
        FailureReason::UnknownNotManaged,
        FailureReason::NotWalkable,
        FailureReason::UnknownManaged,
        FailureReason::UnknownState,
        FailureReason::ThreadExit,
        FailureReason::Deoptimization,
        FailureReason::Safepoint,
        FailureReason::Skipped,
        FailureReason::CollisionOverflow,
    ];

    /// Index into per-session failure counters
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Sentinel location code carried by a failure frame
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            FailureReason::NoManagedFrame => TICKS_NO_MANAGED_FRAME,
            FailureReason::ClassNotLoaded => TICKS_NO_CLASS_LOAD,
            FailureReason::GcActive => TICKS_GC_ACTIVE,
            FailureReason::UnknownNotManaged => TICKS_UNKNOWN_NOT_MANAGED,
            FailureReason::NotWalkable => TICKS_NOT_WALKABLE,
            FailureReason::UnknownManaged => TICKS_UNKNOWN_MANAGED,
            FailureReason::UnknownState => TICKS_UNKNOWN_STATE,
            FailureReason::ThreadExit => TICKS_THREAD_EXIT,
            FailureReason::Deoptimization => TICKS_DEOPT,
            FailureReason::Safepoint => TICKS_SAFEPOINT,
            // Engine-side drops never travel through a frame; reuse the
            // skipped code so the frame stays within the walker's range.
            FailureReason::Skipped | FailureReason::CollisionOverflow => TICKS_SKIPPED,
        }
    }

    /// Map a walker sentinel code back to a reason
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            TICKS_NO_MANAGED_FRAME => Some(FailureReason::NoManagedFrame),
            TICKS_NO_CLASS_LOAD => Some(FailureReason::ClassNotLoaded),
            TICKS_GC_ACTIVE => Some(FailureReason::GcActive),
            TICKS_UNKNOWN_NOT_MANAGED => Some(FailureReason::UnknownNotManaged),
            TICKS_NOT_WALKABLE => Some(FailureReason::NotWalkable),
            TICKS_UNKNOWN_MANAGED => Some(FailureReason::UnknownManaged),
            TICKS_UNKNOWN_STATE => Some(FailureReason::UnknownState),
            TICKS_THREAD_EXIT => Some(FailureReason::ThreadExit),
            TICKS_DEOPT => Some(FailureReason::Deoptimization),
            TICKS_SAFEPOINT => Some(FailureReason::Safepoint),
            TICKS_SKIPPED => Some(FailureReason::Skipped),
            _ => None,
        }
    }

    /// Name used in reports and failure frames
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FailureReason::NoManagedFrame => "no_managed_frame",
            FailureReason::ClassNotLoaded => "class_not_loaded",
            FailureReason::GcActive => "gc_active",
            FailureReason::UnknownNotManaged => "unknown_not_managed",
            FailureReason::NotWalkable => "not_walkable",
            FailureReason::UnknownManaged => "unknown_managed",
            FailureReason::UnknownState => "unknown_state",
            FailureReason::ThreadExit => "thread_exit",
            FailureReason::Deoptimization => "deoptimization",
            FailureReason::Safepoint => "safepoint",
            FailureReason::Skipped => "skipped",
            FailureReason::CollisionOverflow => "collision_overflow",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded meaning of a [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Managed method frame at a position within the method
    Managed { method: MethodId, location: i32 },
    /// Native code at a program counter
    Native { pc: u64 },
    /// Thread annotation frame
    Thread { tid: Tid },
    /// Event subject (allocated class, lock class)
    Event { subject: u64 },
    /// Capture failure reported by the walker
    Failure(FailureReason),
    /// Negative code this engine does not know about
    Unrecognized(i32),
}

impl FrameKind {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of(frame: &Frame) -> Self {
        match frame.location {
            location if location >= 0 => {
                FrameKind::Managed { method: MethodId(frame.method), location }
            }
            LOCATION_NATIVE => FrameKind::Native { pc: frame.method },
            LOCATION_THREAD => FrameKind::Thread { tid: Tid(frame.method as u32) },
            LOCATION_EVENT => FrameKind::Event { subject: frame.method },
            code => FailureReason::from_code(code)
                .map_or(FrameKind::Unrecognized(code), FrameKind::Failure),
        }
    }
}

/// A sample event delivered by an external trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEvent {
    pub kind: EventKind,
    /// Allocated class or contended lock class, appended as the leaf frame
    pub subject: Option<u64>,
}

impl SampleEvent {
    /// Timer-driven sample without a subject
    #[must_use]
    pub const fn tick(kind: EventKind) -> Self {
        Self { kind, subject: None }
    }

    #[must_use]
    pub const fn with_subject(kind: EventKind, subject: u64) -> Self {
        Self { kind, subject: Some(subject) }
    }
}
