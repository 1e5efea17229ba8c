//! Structured error types for stackscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only configuration and state errors reach the caller; capacity problems on
//! the sampling path are counted, never raised.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown argument: {0}")]
    UnknownOption(String),

    #[error("Invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Profiler already started")]
    AlreadyRunning,

    #[error("Profiler is not active")]
    NotRunning,

    #[error("Profiler has been shut down")]
    Terminated,

    #[error("No profile has been collected")]
    NoProfile,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Record stream has no header")]
    MissingHeader,

    #[error("Unexpected record on line {line}")]
    UnexpectedRecord { line: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
