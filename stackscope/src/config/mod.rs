//! Profiler configuration
//!
//! The profiler is configured by an agent-style option string rather than
//! command-line flags; see [`Arguments::parse`].

pub mod arguments;

pub use arguments::{Action, Arguments, Counter, FlameGraphParams, DEFAULT_DUMP_LIMIT};
