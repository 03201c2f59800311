//! Recovery: repairing execution bookkeeping left behind by a crash, and
//! applying the thread-stop action to firings that recover an interrupted run.

use crate::domain::{
    ExecutionState, FiringStep, NodeId, StopContext, StopDirective, StopFiring, StoreError, Task,
    TaskDelta, resolve_thread_stop,
};
use crate::ports::{Precondition, TaskStore};

use super::running::RunningTasks;
use super::state_manager::StateManager;

/// Whether the RUNNING state of `task` still belongs to a live execution.
///
/// Live means: running here and present in the local registry, or running on
/// another node and the trigger engine does not say that node died.
fn owned_by_live_execution(
    task: &Task,
    local: &NodeId,
    running: &RunningTasks,
    recovering: bool,
) -> bool {
    if task.execution_state != ExecutionState::Running {
        return false;
    }
    match &task.node {
        Some(node) if node == local => running.contains(task.oid),
        Some(_) => !recovering,
        None => false,
    }
}

/// Clears a stale node and forces RUNNABLE.
///
/// Persisted before anything else can stop the firing. Ownership by a live
/// execution is left alone; the exclusivity guard deals with it.
pub async fn repair_execution_info(
    store: &dyn TaskStore,
    running: &RunningTasks,
    local: &NodeId,
    task: Task,
    recovering: bool,
) -> FiringStep<Task> {
    if owned_by_live_execution(&task, local, running, recovering) {
        return Ok(task);
    }
    if task.node.is_none() && task.execution_state == ExecutionState::Runnable {
        return Ok(task);
    }

    tracing::info!(
        task = %task,
        node = ?task.node,
        execution_state = ?task.execution_state,
        "repairing stale execution state"
    );
    let delta = TaskDelta::new()
        .clear_node()
        .execution(ExecutionState::Runnable);

    match store
        .modify(task.oid, delta, Precondition::Version(task.version))
        .await
    {
        Ok(repaired) => Ok(repaired),
        Err(e @ StoreError::Conflict { .. }) => Err(StopFiring::error(
            format!("task {task} was modified concurrently while repairing its execution state"),
            e,
        )),
        Err(StoreError::NotFound { oid }) => Err(StopFiring::warning(format!(
            "task {oid} vanished while repairing its execution state"
        ))),
        Err(e) => Err(StopFiring::unexpected(
            format!("couldn't repair execution state of task {task}"),
            e,
        )),
    }
}

/// Applies the thread-stop action to a recovering firing.
///
/// Returns `Ok(())` when the handler should run now.
pub async fn apply_recovery_policy(
    states: &StateManager,
    task: &Task,
    recovering: bool,
) -> FiringStep {
    if !recovering {
        return Ok(());
    }

    let directive = resolve_thread_stop(
        task.thread_stop_action.as_ref(),
        StopContext::Recovering,
        task.recurring,
        task.binding,
    )
    .map_err(|e| {
        StopFiring::unexpected(
            format!("can't apply thread stop action of recovering task {task}"),
            e,
        )
    })?;

    match directive {
        StopDirective::Close => {
            if let Err(e) = states.close(task.oid).await {
                tracing::error!(oid = %task.oid, error = %e, "couldn't close recovering task");
            }
            Err(StopFiring::info(format!(
                "closed recovered task {task} (thread stop action CLOSE)"
            )))
        }
        StopDirective::Suspend => {
            if let Err(e) = states.suspend_no_wait(task.oid).await {
                tracing::error!(oid = %task.oid, error = %e, "couldn't suspend recovering task");
            }
            Err(StopFiring::info(format!(
                "suspended recovered task {task} (thread stop action SUSPEND)"
            )))
        }
        StopDirective::AwaitNaturalRefire => Err(StopFiring::info(format!(
            "recovered task {task} will be re-fired by its trigger (thread stop action RESCHEDULE)"
        ))),
        StopDirective::Resume | StopDirective::RescheduleNow => {
            tracing::info!(task = %task, "recovering task resumes execution");
            Ok(())
        }
    }
}
