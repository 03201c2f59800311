//! Execution state machine: entering RUNNING and leaving it.
//!
//! ```text
//! RUNNABLE --start_running--> RUNNING --finalize--> f(scheduling state)
//! ```
//!
//! `finalize` runs on every exit path of a firing that set its node.

use super::exclusivity::concurrent_execution;
use crate::domain::{
    ExecutionState, FiringStep, NodeId, SchedulingState, StopFiring, StoreError, Task, TaskDelta,
    TaskOid,
};
use crate::ports::{Precondition, TaskStore};

/// Execution state that matches a scheduling state after a run.
///
/// `None` means "leave it": a handler that moved its task to WAITING already
/// set the execution state too. A leftover RUNNING is still turned into
/// WAITING because RUNNING requires an assigned node.
pub fn execution_state_after_run(
    scheduling: SchedulingState,
    current: ExecutionState,
) -> Option<ExecutionState> {
    match scheduling {
        SchedulingState::Suspended => Some(ExecutionState::Suspended),
        SchedulingState::Closed => Some(ExecutionState::Closed),
        SchedulingState::Waiting if current == ExecutionState::Running => {
            Some(ExecutionState::Waiting)
        }
        SchedulingState::Waiting => None,
        SchedulingState::Ready => Some(ExecutionState::Runnable),
    }
}

/// Sets RUNNING and the local node, guarded by the snapshot's version.
///
/// A version conflict means someone else touched the task since it was
/// loaded. If that someone now holds it RUNNING, the stop is the same
/// exclusivity error the guard reports.
pub async fn start_running(store: &dyn TaskStore, task: &Task, node: &NodeId) -> FiringStep<Task> {
    let delta = TaskDelta::new()
        .execution(ExecutionState::Running)
        .node(node.clone());

    match store
        .modify(task.oid, delta, Precondition::Version(task.version))
        .await
    {
        Ok(updated) => {
            tracing::debug!(oid = %task.oid, %node, "task is now running");
            Ok(updated)
        }
        Err(e @ StoreError::Conflict { .. }) => Err(lost_race(store, task, e).await),
        Err(StoreError::NotFound { oid }) => Err(StopFiring::warning(format!(
            "task {oid} vanished before it could start"
        ))),
        Err(e) => Err(StopFiring::unexpected(
            format!("couldn't mark task {task} as running"),
            e,
        )),
    }
}

/// Explains a lost version race: a fresh copy held RUNNING by some node means
/// another firing won it.
async fn lost_race(store: &dyn TaskStore, task: &Task, conflict: StoreError) -> StopFiring {
    match store.get(task.oid).await {
        Ok(fresh) if fresh.execution_state == ExecutionState::Running => match fresh.node {
            Some(node) => concurrent_execution(task, node),
            None => modified_concurrently(task, conflict),
        },
        _ => modified_concurrently(task, conflict),
    }
}

fn modified_concurrently(task: &Task, conflict: StoreError) -> StopFiring {
    StopFiring::error(
        format!("task {task} was modified concurrently; not starting it"),
        conflict,
    )
}

/// Clears the node and settles the execution state from the current
/// scheduling state. Failures are logged, never propagated.
///
/// If the scheduling state changes between read and write, the task is
/// re-read and the state recomputed once.
pub async fn finalize(store: &dyn TaskStore, oid: TaskOid) {
    let mut last_read = None;
    for attempt in 0..2 {
        let current = match store.get(oid).await {
            Ok(t) => t,
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(%oid, "task vanished before finalization");
                return;
            }
            Err(e) => {
                tracing::error!(%oid, error = %e, "couldn't read task to finalize it");
                return;
            }
        };

        let delta = settle_delta(&current);
        let scheduling = current.scheduling_state;
        last_read = Some(current);

        match store
            .modify(oid, delta, Precondition::SchedulingState(scheduling))
            .await
        {
            Ok(t) => {
                tracing::trace!(%oid, execution_state = ?t.execution_state, "task finalized");
                return;
            }
            Err(StoreError::PreconditionFailed { reason, .. }) if attempt == 0 => {
                tracing::debug!(%oid, %reason, "scheduling state changed during finalization, retrying");
            }
            Err(e) => {
                tracing::error!(%oid, error = %e, "couldn't finalize task state");
                break;
            }
        }
    }

    // unconditional write; RUNNING must not outlive the node
    let latest = store.get(oid).await.ok().or(last_read);
    let delta = match &latest {
        Some(task) => settle_delta(task),
        None => TaskDelta::new().clear_node(),
    };
    if let Err(e) = store.modify(oid, delta, Precondition::None).await {
        tracing::error!(%oid, error = %e, "couldn't clear node of task");
    }
}

fn settle_delta(task: &Task) -> TaskDelta {
    let delta = TaskDelta::new().clear_node();
    match execution_state_after_run(task.scheduling_state, task.execution_state) {
        Some(state) if state != task.execution_state => delta.execution(state),
        _ => delta,
    }
}
