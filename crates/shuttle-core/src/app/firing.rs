//! Per-firing state and the context handed to handlers.

use std::sync::Arc;

use super::children::LightweightContext;
use super::handle::ExecutionHandle;
use crate::domain::{
    ChildId, ExecutionConstraints, ExecutionState, OperationResult, SchedulingState, StoreError,
    Task, TaskDelta, TaskOid,
};
use crate::ports::{Precondition, TaskStore};

/// Operation name of the result tree a firing records.
pub const FIRING_OPERATION: &str = "shuttle.firing";

/// State carried through one firing, from load to return.
#[derive(Debug)]
pub struct Firing {
    /// Last known copy of the task.
    pub task: Task,
    /// Constraints admission applies: the task's own or its root's.
    pub constraints: Option<ExecutionConstraints>,
    pub root_oid: TaskOid,
    pub recovering: bool,
    pub handle: Arc<ExecutionHandle>,
    pub result: OperationResult,
    /// Set once this firing has written its node into the task.
    pub node_set: bool,
}

impl Firing {
    pub fn oid(&self) -> TaskOid {
        self.task.oid
    }
}

/// What a handler gets to see and do during its run.
pub struct RunContext<'a> {
    task: &'a Task,
    handle: &'a Arc<ExecutionHandle>,
    store: &'a dyn TaskStore,
    recovering: bool,
}

impl<'a> RunContext<'a> {
    pub fn new(
        task: &'a Task,
        handle: &'a Arc<ExecutionHandle>,
        store: &'a dyn TaskStore,
        recovering: bool,
    ) -> Self {
        Self {
            task,
            handle,
            store,
            recovering,
        }
    }

    pub fn task(&self) -> &Task {
        self.task
    }

    pub fn oid(&self) -> TaskOid {
        self.task.oid
    }

    /// True if this run resumes one whose node died.
    pub fn recovering(&self) -> bool {
        self.recovering
    }

    /// Cooperative stop flag. Handlers should check it regularly.
    pub fn can_run(&self) -> bool {
        self.handle.can_run()
    }

    /// Resolves when the main handler is hard-interrupted.
    pub async fn interrupted(&self) {
        self.handle.interrupted().await
    }

    pub fn spawn_lightweight<F, Fut>(&self, name: impl Into<String>, work: F) -> ChildId
    where
        F: FnOnce(LightweightContext) -> Fut,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        self.handle.spawn_lightweight(name, work)
    }

    /// Puts the task into WAITING (both scheduling and execution state).
    /// Finalization leaves the execution state alone afterwards.
    pub async fn switch_to_waiting(&self) -> Result<Task, StoreError> {
        tracing::debug!(oid = %self.oid(), "handler switches task to WAITING");
        self.store
            .modify(
                self.oid(),
                TaskDelta::new()
                    .scheduling(SchedulingState::Waiting)
                    .execution(ExecutionState::Waiting),
                Precondition::None,
            )
            .await
    }
}
