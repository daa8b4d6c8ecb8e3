//! Live process bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::ChildStdin;
use uuid::Uuid;

/// A spawned process that has not yet reached a terminal event.
#[derive(Clone)]
pub struct RunningProcess {
    pub pid: u32,
    pub command_line: String,
    pub started_at: DateTime<Utc>,
    /// Distinguishes this lifecycle from a later process that reuses the pid.
    pub(crate) instance: Uuid,
    pub(crate) stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
}

impl RunningProcess {
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            command_line: self.command_line.clone(),
            started_at: self.started_at,
        }
    }
}

/// Public snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command_line: String,
    pub started_at: DateTime<Utc>,
}

/// pid -> running process, shared between the engine and reaper tasks.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<u32, RunningProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, RunningProcess>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, process: RunningProcess) {
        self.lock().insert(process.pid, process);
    }

    pub fn get(&self, pid: u32) -> Option<RunningProcess> {
        self.lock().get(&pid).cloned()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    /// Remove `pid`. Removing an absent pid is a no-op.
    pub fn deregister(&self, pid: u32) -> Option<RunningProcess> {
        self.lock().remove(&pid)
    }

    /// Remove `pid` only if it still belongs to `instance`.
    pub(crate) fn deregister_instance(&self, pid: u32, instance: Uuid) -> bool {
        let mut entries = self.lock();
        match entries.get(&pid) {
            Some(entry) if entry.instance == instance => {
                entries.remove(&pid);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of every registered process, oldest first.
    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self.lock().values().map(RunningProcess::info).collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32) -> RunningProcess {
        RunningProcess {
            pid,
            command_line: "sleep 1".to_string(),
            started_at: Utc::now(),
            instance: Uuid::new_v4(),
            stdin: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = ProcessRegistry::new();
        registry.register(entry(10));
        registry.register(entry(11));

        assert!(registry.deregister(10).is_some());
        assert!(registry.deregister(10).is_none());
        assert!(registry.contains(11));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_instance_does_not_remove_reused_pid() {
        let registry = ProcessRegistry::new();
        let first = entry(42);
        let stale = first.instance;
        registry.register(first);
        registry.deregister(42);
        registry.register(entry(42));

        assert!(!registry.deregister_instance(42, stale));
        assert!(registry.contains(42));
    }
}
