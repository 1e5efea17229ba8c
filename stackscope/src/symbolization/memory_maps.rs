//! Memory mapping utilities for process address space analysis
//!
//! This module parses /proc/pid/maps to find the executable, file-backed
//! mappings of a process. Each one is a shared library (or the main
//! executable) whose symbols can be loaded into a
//! [`NativeCodeCache`](super::NativeCodeCache).

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;

/// Memory range of a loaded object in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// An executable mapping of an object file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedObject {
    pub path: String,
    pub range: MemoryRange,
    /// Offset of the mapping within the file
    pub offset: u64,
}

impl MappedObject {
    /// Value added to file virtual addresses to get runtime addresses
    ///
    /// Assumes the usual layout where the text segment's virtual address
    /// equals its file offset.
    #[must_use]
    pub fn load_bias(&self) -> u64 {
        self.range.start.wrapping_sub(self.offset)
    }
}

/// Parse the text of a maps file into executable file-backed mappings
///
/// Lines look like `start-end perms offset dev inode pathname`. Only
/// mappings with `x` permission and an absolute path are kept; the first
/// executable mapping of each path wins.
#[must_use]
pub fn parse_executable_mappings(maps: &str) -> Vec<MappedObject> {
    let mut objects: BTreeMap<u64, MappedObject> = BTreeMap::new();
    let mut seen = std::collections::HashSet::new();

    for line in maps.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 || !parts[1].contains('x') || !parts[5].starts_with('/') {
            continue;
        }
        let Some((start, end)) = parts[0].split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end), Ok(offset)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
            u64::from_str_radix(parts[2], 16),
        ) else {
            continue;
        };

        // Paths may contain spaces
        let path = parts[5..].join(" ");
        if seen.insert(path.clone()) {
            objects.insert(start, MappedObject { path, range: MemoryRange { start, end }, offset });
        }
    }

    objects.into_values().collect()
}

/// Executable mappings of the current process
///
/// # Errors
/// Returns an error if /proc/self/maps cannot be read
pub fn current_process_mappings() -> Result<Vec<MappedObject>> {
    let maps = fs::read_to_string("/proc/self/maps").context("Failed to read /proc/self/maps")?;
    Ok(parse_executable_mappings(&maps))
}
