//! Administrative state changes the coordinator performs on a task:
//! close, suspend (without waiting for itself), schedule to run now.

use std::sync::Arc;

use crate::domain::{
    ExecutionState, OperationResult, SchedulingState, ShuttleError, Task, TaskDelta, TaskOid,
};
use crate::ports::{Clock, Precondition, TaskStore, TriggerEngine};

pub struct StateManager {
    store: Arc<dyn TaskStore>,
    trigger: Arc<dyn TriggerEngine>,
    clock: Arc<dyn Clock>,
}

impl StateManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        trigger: Arc<dyn TriggerEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            trigger,
            clock,
        }
    }

    /// Closes the task and drops its job.
    ///
    /// A RUNNING execution state is left for finalization to settle.
    pub async fn close(&self, oid: TaskOid) -> Result<Task, ShuttleError> {
        let current = self.store.get(oid).await?;
        let mut delta = TaskDelta::new()
            .scheduling(SchedulingState::Closed)
            .completed_at(self.clock.now());
        if current.execution_state != ExecutionState::Running {
            delta = delta.execution(ExecutionState::Closed);
        }
        let closed = self.store.modify(oid, delta, Precondition::None).await?;
        self.trigger.delete_job(oid).await?;
        tracing::info!(%oid, "task closed");
        Ok(closed)
    }

    /// Suspends the task without waiting for its thread to stop; the caller
    /// is that thread.
    pub async fn suspend_no_wait(&self, oid: TaskOid) -> Result<Task, ShuttleError> {
        let current = self.store.get(oid).await?;
        let mut delta = TaskDelta::new().scheduling(SchedulingState::Suspended);
        if current.execution_state != ExecutionState::Running {
            delta = delta.execution(ExecutionState::Suspended);
        }
        let suspended = self.store.modify(oid, delta, Precondition::None).await?;
        self.trigger.unschedule(oid).await?;
        tracing::info!(%oid, "task suspended");
        Ok(suspended)
    }

    /// Makes the task READY and asks the trigger engine to fire it at once.
    pub async fn schedule_now(&self, oid: TaskOid) -> Result<(), ShuttleError> {
        self.store
            .modify(
                oid,
                TaskDelta::new().scheduling(SchedulingState::Ready),
                Precondition::None,
            )
            .await?;
        self.trigger.schedule_now(oid).await?;
        tracing::info!(%oid, "task scheduled to run now");
        Ok(())
    }

    pub async fn record_result(
        &self,
        oid: TaskOid,
        result: &OperationResult,
    ) -> Result<Task, ShuttleError> {
        Ok(self
            .store
            .modify(oid, TaskDelta::new().result(result.clone()), Precondition::None)
            .await?)
    }
}
