//! Immutable, versioned view of a session's aggregated data
//!
//! Reports never touch the live tables. A [`Snapshot`] copies counts and
//! resolves every frame to a name once; all renderers read from it. The
//! same structure is what the record dump writes and reads back.

use serde::{Deserialize, Serialize};
use stackscope_common::Frame;

use crate::domain::{EventKind, FailureReason, FrameKind, MethodId, FAILURE_TYPES};
use crate::profiling::{Session, ThreadRegistry};
use crate::symbolization::{CodeCache, NameRegistry, NativeCodeCache, NativeLibraries};

/// Name used for native addresses no cache can resolve
pub const UNKNOWN_FRAME: &str = "[unknown]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameBufferUsage {
    pub used: u64,
    pub capacity: u64,
    pub overflowed: bool,
}

/// Session-wide totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub generation: u64,
    pub event: EventKind,
    pub interval: u64,
    pub uptime_ms: u64,
    pub total_samples: u64,
    pub total_counter: u64,
    pub failures: [u64; FAILURE_TYPES],
    pub dropped_methods: u64,
    pub frame_buffer: FrameBufferUsage,
}

impl SessionInfo {
    #[must_use]
    pub fn failure_count(&self, reason: FailureReason) -> u64 {
        self.failures[reason.index()]
    }

    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.failures.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFrame {
    pub frame: Frame,
    pub name: String,
}

/// One distinct call trace, frames root first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSample {
    pub samples: u64,
    pub counter: u64,
    pub sequence: u64,
    pub frames: Vec<NamedFrame>,
}

/// One leaf frame of the flat profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub samples: u64,
    pub counter: u64,
    pub sequence: u64,
    pub frame: NamedFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub info: SessionInfo,
    /// Ordered by first appearance
    pub traces: Vec<TraceSample>,
    /// Ordered by first appearance
    pub methods: Vec<MethodEntry>,
}

impl Snapshot {
    /// Copy the aggregated state of `session`, naming frames with `namer`
    #[must_use]
    pub fn capture(session: &Session, namer: &FrameNamer<'_>) -> Self {
        let name = |frame: Frame| NamedFrame { frame, name: namer.name(&frame) };

        let mut traces: Vec<TraceSample> = session
            .traces
            .samples()
            .map(|sample| TraceSample {
                samples: sample.samples,
                counter: sample.counter,
                sequence: sample.sequence,
                frames: session.traces.frames(&sample).map(name).collect(),
            })
            .collect();
        traces.sort_by_key(|t| t.sequence);

        let mut methods: Vec<MethodEntry> = session
            .methods
            .samples()
            .map(|sample| MethodEntry {
                samples: sample.samples,
                counter: sample.counter,
                sequence: sample.sequence,
                frame: name(sample.value),
            })
            .collect();
        methods.sort_by_key(|m| m.sequence);

        let buffer = session.traces.frame_buffer();
        let info = SessionInfo {
            generation: session.generation,
            event: session.args.event,
            interval: session.args.effective_interval(),
            uptime_ms: u64::try_from(session.uptime().as_millis()).unwrap_or(u64::MAX),
            total_samples: session.total_samples(),
            total_counter: session.total_counter(),
            failures: session.failures(),
            dropped_methods: session.dropped_methods(),
            frame_buffer: FrameBufferUsage {
                used: buffer.used() as u64,
                capacity: buffer.capacity() as u64,
                overflowed: buffer.overflowed(),
            },
        };

        Self { info, traces, methods }
    }
}

/// Turns raw frames into display names
pub struct FrameNamer<'a> {
    pub names: &'a NameRegistry,
    pub threads: &'a ThreadRegistry,
    pub compiled: &'a CodeCache<MethodId>,
    pub stubs: &'a NativeCodeCache,
    pub libraries: &'a NativeLibraries,
    /// Strip package qualifiers from managed names
    pub simple: bool,
    /// Suffix managed frames with `_[j]`
    pub annotate: bool,
}

impl FrameNamer<'_> {
    #[must_use]
    pub fn name(&self, frame: &Frame) -> String {
        match FrameKind::of(frame) {
            FrameKind::Managed { method, .. } => self.managed_name(method),
            FrameKind::Native { pc } => self.native_name(pc),
            FrameKind::Thread { tid } => match self.threads.name(tid) {
                Some(name) => format!("[{name} tid={}]", tid.0),
                None => format!("[tid={}]", tid.0),
            },
            FrameKind::Event { subject } => self
                .names
                .subject(subject)
                .map_or_else(|| format!("subject@0x{subject:x}"), |name| name.to_string()),
            FrameKind::Failure(reason) => format!("[{reason}]"),
            FrameKind::Unrecognized(_) => format!("[{}]", FailureReason::UnknownState),
        }
    }

    fn managed_name(&self, method: MethodId) -> String {
        let full = self.names.method(method).map_or_else(|| method.to_string(), |n| n.to_string());
        let name = if self.simple { simple_name(&full) } else { &full };
        if self.annotate {
            format!("{name}_[j]")
        } else {
            name.to_string()
        }
    }

    fn native_name(&self, pc: u64) -> String {
        if let Some(symbol) = self.stubs.lookup(pc).or_else(|| self.libraries.lookup(pc)) {
            return symbol.to_string();
        }
        match self.compiled.lookup(pc) {
            Some(method) => self.managed_name(method),
            None => UNKNOWN_FRAME.to_string(),
        }
    }
}

/// `pkg.sub.Class.method` → `Class.method`
fn simple_name(name: &str) -> &str {
    let is_separator = |c: char| c == '.' || c == '/';
    let Some(method_dot) = name.rfind('.') else {
        return name;
    };
    match name[..method_dot].rfind(is_separator) {
        Some(class_start) => &name[class_start + 1..],
        None => name,
    }
}
