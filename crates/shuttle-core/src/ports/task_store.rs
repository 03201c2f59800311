//! TaskStore port - タスクの正本（source of truth）
//!
//! The persisted task record is the only shared mutable resource of the
//! coordinator. Everything that matters for correctness (RUNNING vs not,
//! assigned node) is written through `modify` with a precondition.

use async_trait::async_trait;

use crate::domain::{SchedulingState, StoreError, Task, TaskDelta, TaskOid};

/// Guard evaluated atomically with a `modify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write.
    None,
    /// The stored version must equal this one; fails with `StoreError::Conflict`.
    Version(u64),
    /// The stored scheduling state must equal this one; fails with
    /// `StoreError::PreconditionFailed`.
    SchedulingState(SchedulingState),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Not-found is reported as `StoreError::NotFound`, distinct from I/O failure.
    async fn get(&self, oid: TaskOid) -> Result<Task, StoreError>;

    /// Applies `delta` if `precondition` holds and returns the updated task.
    /// Every successful modify bumps `version`.
    async fn modify(
        &self,
        oid: TaskOid,
        delta: TaskDelta,
        precondition: Precondition,
    ) -> Result<Task, StoreError>;

    /// Number of tasks in `group` with execution state RUNNING, not counting `exclude`.
    ///
    /// A task without its own execution constraints belongs to the groups of
    /// its hierarchy root.
    async fn count_running_in_group(
        &self,
        group: &str,
        exclude: TaskOid,
    ) -> Result<usize, StoreError>;

    /// Administrative insert; replaces nothing.
    async fn insert(&self, task: Task) -> Result<(), StoreError>;
}
