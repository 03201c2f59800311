//! Exclusivity guard: one execution per task, cluster-wide.
//!
//! This is a best-effort optimistic check. Actual mutual exclusion comes from
//! the versioned write in `execution_state::start_running` and, within one
//! node, from `RunningTasks::register`.

use crate::domain::{
    ExecutionState, FiringStep, NodeId, ShuttleError, StopFiring, StoreError, Task,
};
use crate::ports::TaskStore;

/// Re-reads the task and refuses if some node holds it RUNNING.
///
/// Disabled by `check_concurrent_execution = false`.
pub async fn ensure_not_running_elsewhere(
    store: &dyn TaskStore,
    enabled: bool,
    snapshot: &Task,
) -> FiringStep {
    if !enabled {
        return Ok(());
    }

    let fresh = match store.get(snapshot.oid).await {
        Ok(t) => t,
        Err(StoreError::NotFound { oid }) => {
            return Err(StopFiring::warning(format!(
                "task {oid} vanished before it could start"
            )));
        }
        Err(e) => {
            return Err(StopFiring::unexpected(
                format!("couldn't re-read task {snapshot} for the concurrent execution check"),
                e,
            ));
        }
    };

    if fresh.execution_state == ExecutionState::Running
        && let Some(node) = fresh.node
    {
        return Err(concurrent_execution(snapshot, node));
    }
    if fresh.version != snapshot.version {
        tracing::debug!(
            oid = %snapshot.oid,
            loaded = snapshot.version,
            current = fresh.version,
            "task changed since it was loaded"
        );
    }
    Ok(())
}

/// The stop reported when another execution holds the task.
pub fn concurrent_execution(task: &Task, node: NodeId) -> StopFiring {
    StopFiring::error(
        format!("task {task} is already running on node {node}; not starting it again"),
        ShuttleError::ConcurrentExecution {
            oid: task.oid,
            node,
        },
    )
}
