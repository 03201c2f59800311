//! TriggerEngine port - the external cron-like scheduler that fires tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{SchedulerError, TaskOid};

#[async_trait]
pub trait TriggerEngine: Send + Sync {
    /// Removes the trigger of a task that is no longer ready.
    async fn unschedule(&self, oid: TaskOid) -> Result<(), SchedulerError>;

    /// Drops the job of a task that vanished from the store.
    async fn delete_job(&self, oid: TaskOid) -> Result<(), SchedulerError>;

    /// Whether the local scheduler is still running (false while the node shuts down).
    async fn is_running(&self) -> bool;

    async fn reschedule_later(&self, oid: TaskOid, at: DateTime<Utc>) -> Result<(), SchedulerError>;

    async fn schedule_now(&self, oid: TaskOid) -> Result<(), SchedulerError>;

    /// Next natural fire time of the task's trigger, if it has one.
    async fn next_fire_time(&self, oid: TaskOid) -> Result<Option<DateTime<Utc>>, SchedulerError>;
}
