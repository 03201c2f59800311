//! Node-local registry of running firings, keyed by task OID.
//!
//! Used for interrupt delivery and diagnostics only; the task store remains
//! the source of truth for who runs what.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::handle::ExecutionHandle;
use crate::domain::TaskOid;

#[derive(Default)]
pub struct RunningTasks {
    handles: Mutex<HashMap<TaskOid, Arc<ExecutionHandle>>>,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` unless a firing of the same task is already
    /// registered. The registration is removed when the returned guard drops.
    pub fn register(&self, handle: Arc<ExecutionHandle>) -> Option<RunningRegistration<'_>> {
        let oid = handle.oid();
        let mut handles = self.lock();
        if handles.contains_key(&oid) {
            return None;
        }
        handles.insert(oid, Arc::clone(&handle));
        Some(RunningRegistration {
            registry: self,
            handle,
        })
    }

    pub fn get(&self, oid: TaskOid) -> Option<Arc<ExecutionHandle>> {
        self.lock().get(&oid).cloned()
    }

    pub fn contains(&self, oid: TaskOid) -> bool {
        self.lock().contains_key(&oid)
    }

    /// OIDs of the tasks currently executing on this node.
    pub fn list(&self) -> Vec<TaskOid> {
        let mut oids: Vec<_> = self.lock().keys().copied().collect();
        oids.sort();
        oids
    }

    pub fn handles(&self) -> Vec<Arc<ExecutionHandle>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskOid, Arc<ExecutionHandle>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard returned by `RunningTasks::register`.
#[must_use = "the handle is deregistered as soon as the guard is dropped"]
pub struct RunningRegistration<'a> {
    registry: &'a RunningTasks,
    handle: Arc<ExecutionHandle>,
}

impl RunningRegistration<'_> {
    pub fn handle(&self) -> &Arc<ExecutionHandle> {
        &self.handle
    }
}

impl Drop for RunningRegistration<'_> {
    fn drop(&mut self) {
        let mut handles = self.registry.lock();
        // only remove our own entry
        if handles
            .get(&self.handle.oid())
            .is_some_and(|h| Arc::ptr_eq(h, &self.handle))
        {
            handles.remove(&self.handle.oid());
        }
    }
}
