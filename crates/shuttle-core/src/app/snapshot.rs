//! Snapshot loader: task OID -> task copy plus its hierarchy root.

use std::collections::HashSet;

use crate::domain::{
    ExecutionConstraints, FiringStep, MAX_HIERARCHY_DEPTH, StopFiring, StoreError, Task, TaskOid,
};
use crate::ports::{TaskStore, TriggerEngine};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub task: Task,
    pub root_oid: TaskOid,
    /// Own constraints, or the root's if the task has none.
    pub constraints: Option<ExecutionConstraints>,
}

/// Fetches the task.
///
/// A vanished task gets its job deleted and stops the firing at warning
/// level. Any other store failure is unexpected; the trigger is kept so the
/// next firing can retry.
pub async fn load(
    store: &dyn TaskStore,
    trigger: &dyn TriggerEngine,
    oid: TaskOid,
) -> FiringStep<Snapshot> {
    let task = match store.get(oid).await {
        Ok(task) => task,
        Err(StoreError::NotFound { .. }) => {
            if let Err(e) = trigger.delete_job(oid).await {
                tracing::error!(%oid, error = %e, "couldn't delete job of vanished task");
            }
            return Err(StopFiring::warning(format!(
                "task {oid} does not exist; its job was deleted"
            )));
        }
        Err(e) => {
            return Err(StopFiring::unexpected(
                format!("couldn't fetch task {oid}"),
                e,
            ));
        }
    };

    let root = resolve_root(store, &task).await?;
    let constraints = task
        .execution_constraints
        .clone()
        .or_else(|| root.as_ref().and_then(|r| r.execution_constraints.clone()));
    let root_oid = root.as_ref().map_or(task.oid, |r| r.oid);

    Ok(Snapshot {
        task,
        root_oid,
        constraints,
    })
}

/// Walks up the parent chain. `None` when the task is its own root.
///
/// A missing ancestor, a cycle or a too deep chain ends the walk at the last
/// ancestor found.
async fn resolve_root(store: &dyn TaskStore, task: &Task) -> FiringStep<Option<Task>> {
    let mut visited = HashSet::from([task.oid]);
    let mut root: Option<Task> = None;
    let mut next = task.parent;

    while let Some(parent) = next {
        if !visited.insert(parent) || visited.len() > MAX_HIERARCHY_DEPTH {
            tracing::warn!(oid = %task.oid, %parent, "task hierarchy has a cycle or is too deep");
            break;
        }
        match store.get(parent).await {
            Ok(p) => {
                next = p.parent;
                root = Some(p);
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(oid = %task.oid, %parent, "parent task not found");
                break;
            }
            Err(e) => {
                return Err(StopFiring::unexpected(
                    format!("couldn't resolve root of task {}", task.oid),
                    e,
                ));
            }
        }
    }

    Ok(root)
}
