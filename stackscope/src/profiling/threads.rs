//! Thread name registry
//!
//! Filled by thread start/end notifications from the runtime and, when
//! thread annotation is enabled, seeded from /proc/pid/task/*/comm. Traces
//! only carry the thread id; names are looked up when reports are built.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::Tid;

#[derive(Default)]
pub struct ThreadRegistry {
    names: RwLock<HashMap<Tid, Arc<str>>>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_thread_start(&self, tid: Tid, name: &str) {
        self.set_name(tid, name);
    }

    /// A thread is exiting
    ///
    /// Its name is kept so traces recorded earlier still render with it.
    pub fn on_thread_end(&self, tid: Tid, name: Option<&str>) {
        if let Some(name) = name {
            self.set_name(tid, name);
        }
    }

    pub fn set_name(&self, tid: Tid, name: &str) {
        self.names.write().unwrap_or_else(PoisonError::into_inner).insert(tid, Arc::from(name));
    }

    pub fn name(&self, tid: Tid) -> Option<Arc<str>> {
        self.names.read().unwrap_or_else(PoisonError::into_inner).get(&tid).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register every live thread of the current process
    ///
    /// # Errors
    /// Returns an error if /proc/self/task cannot be read
    pub fn seed_from_proc(&self) -> Result<usize> {
        let threads = list_threads("self")?;
        let count = threads.len();
        for (tid, name) in threads {
            self.set_name(tid, &name);
        }
        log::debug!("Registered {count} thread names from /proc");
        Ok(count)
    }
}

/// Read `(tid, comm)` of every thread of a process from /proc/pid/task
///
/// `pid` is a numeric process id or `self`.
///
/// # Errors
/// Returns an error if the task directory cannot be read
pub fn list_threads(pid: &str) -> Result<Vec<(Tid, String)>> {
    let task_dir = format!("/proc/{pid}/task");
    let entries = fs::read_dir(&task_dir).with_context(|| format!("Failed to read {task_dir}"))?;

    let mut threads: Vec<(Tid, String)> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let tid = entry.file_name().to_string_lossy().parse::<u32>().ok()?;
            let comm = fs::read_to_string(entry.path().join("comm")).ok()?;
            Some((Tid(tid), comm.trim().to_string()))
        })
        .collect();
    threads.sort_by_key(|(tid, _)| *tid);
    Ok(threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_survive_thread_end() {
        let registry = ThreadRegistry::new();
        registry.on_thread_start(Tid(10), "worker-1");
        registry.on_thread_end(Tid(10), None);
        assert_eq!(registry.name(Tid(10)).as_deref(), Some("worker-1"));

        registry.on_thread_end(Tid(10), Some("worker-1-renamed"));
        assert_eq!(registry.name(Tid(10)).as_deref(), Some("worker-1-renamed"));
        assert_eq!(registry.name(Tid(11)), None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_list_threads_self_process() {
        let threads = list_threads("self").unwrap();
        assert!(!threads.is_empty());
        assert!(threads.iter().any(|(tid, _)| *tid == crate::profiling::os::current_tid()));
    }

    #[test]
    fn test_list_threads_invalid_pid() {
        assert!(list_threads("999999999").is_err());
    }
}
