//! RecordingListener - TaskListener that remembers what it was told.

use std::sync::Mutex;

use crate::domain::{OperationResult, ResultStatus, Task, TaskOid};
use crate::ports::TaskListener;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Started { oid: TaskOid, recovering: bool },
    Finished { oid: TaskOid, status: ResultStatus },
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, event: ListenerEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl TaskListener for RecordingListener {
    fn on_thread_start(&self, task: &Task, recovering: bool) {
        tracing::debug!(oid = %task.oid, recovering, "task thread started");
        self.push(ListenerEvent::Started {
            oid: task.oid,
            recovering,
        });
    }

    fn on_thread_finish(&self, task: &Task, result: &OperationResult) {
        tracing::debug!(oid = %task.oid, status = ?result.status, "task thread finished");
        self.push(ListenerEvent::Finished {
            oid: task.oid,
            status: result.status,
        });
    }
}
