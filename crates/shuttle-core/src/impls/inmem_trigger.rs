//! InMemoryTriggerEngine - 開発用のトリガーエンジン
//!
//! Does not fire anything by itself. It records every call the coordinator
//! makes so tests and the demo can inspect them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{SchedulerError, TaskOid};
use crate::ports::TriggerEngine;

/// A call made on the trigger engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Unscheduled(TaskOid),
    JobDeleted(TaskOid),
    RescheduledLater(TaskOid, DateTime<Utc>),
    ScheduledNow(TaskOid),
}

#[derive(Default)]
struct TriggerState {
    events: Vec<TriggerEvent>,
    next_fire_times: HashMap<TaskOid, DateTime<Utc>>,
}

#[derive(Clone)]
pub struct InMemoryTriggerEngine {
    state: Arc<Mutex<TriggerState>>,
    running: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl Default for InMemoryTriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTriggerEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TriggerState::default())),
            running: Arc::new(AtomicBool::new(true)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulates the local scheduler shutting down (or starting again).
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Makes every mutating call fail while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_next_fire_time(&self, oid: TaskOid, at: DateTime<Utc>) {
        self.lock().next_fire_times.insert(oid, at);
    }

    pub fn events(&self) -> Vec<TriggerEvent> {
        self.lock().events.clone()
    }

    pub fn events_for(&self, oid: TaskOid) -> Vec<TriggerEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.oid() == oid)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: TriggerEvent) -> Result<(), SchedulerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::Backend("trigger engine unavailable".to_string()));
        }
        self.lock().events.push(event);
        Ok(())
    }
}

impl TriggerEvent {
    pub fn oid(&self) -> TaskOid {
        match self {
            TriggerEvent::Unscheduled(oid)
            | TriggerEvent::JobDeleted(oid)
            | TriggerEvent::RescheduledLater(oid, _)
            | TriggerEvent::ScheduledNow(oid) => *oid,
        }
    }
}

#[async_trait]
impl TriggerEngine for InMemoryTriggerEngine {
    async fn unschedule(&self, oid: TaskOid) -> Result<(), SchedulerError> {
        self.record(TriggerEvent::Unscheduled(oid))
    }

    async fn delete_job(&self, oid: TaskOid) -> Result<(), SchedulerError> {
        self.lock().next_fire_times.remove(&oid);
        self.record(TriggerEvent::JobDeleted(oid))
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn reschedule_later(
        &self,
        oid: TaskOid,
        at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.record(TriggerEvent::RescheduledLater(oid, at))
    }

    async fn schedule_now(&self, oid: TaskOid) -> Result<(), SchedulerError> {
        self.record(TriggerEvent::ScheduledNow(oid))
    }

    async fn next_fire_time(&self, oid: TaskOid) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        Ok(self.lock().next_fire_times.get(&oid).copied())
    }
}
