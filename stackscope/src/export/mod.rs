//! Raw profile export
//!
//! This module writes aggregated profiles as a sequential record stream
//! for offline reprocessing, and reads such streams back.

pub mod records;

pub use records::{load_records, read_records, save_records, write_records};
