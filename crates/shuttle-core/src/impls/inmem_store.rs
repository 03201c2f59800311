//! InMemoryTaskStore - 開発用・テスト用の正本
//!
//! # 実装詳細
//! - HashMap<TaskOid, Task> を tokio Mutex で保護
//! - modify ごとに version をインクリメント（楽観ロック）
//! - `set_unavailable(true)` で I/O 障害を再現

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ExecutionConstraints, ExecutionState, MAX_HIERARCHY_DEPTH, StoreError, Task, TaskDelta, TaskOid,
};
use crate::ports::{Precondition, TaskStore};

/// In-memory task store.
///
/// # 使用例
/// ```ignore
/// let store = InMemoryTaskStore::new();
/// store.insert(task).await?;
/// let t = store.get(oid).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<Mutex<HashMap<TaskOid, Task>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `StoreError::Backend` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Removes a task, as an administrator deleting it would.
    pub async fn remove(&self, oid: TaskOid) -> Option<Task> {
        self.tasks.lock().await.remove(&oid)
    }

    /// All stored tasks, in no particular order.
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.lock().await.values().cloned().collect()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

/// Own constraints, or the root's. The walk stops the same way the snapshot
/// loader's does, so both agree on group membership.
fn effective_constraints<'a>(
    tasks: &'a HashMap<TaskOid, Task>,
    task: &'a Task,
) -> Option<&'a ExecutionConstraints> {
    if task.execution_constraints.is_some() {
        return task.execution_constraints.as_ref();
    }
    let mut visited = HashSet::from([task.oid]);
    let mut current = task;
    while let Some(parent) = current.parent {
        if !visited.insert(parent) || visited.len() > MAX_HIERARCHY_DEPTH {
            break;
        }
        match tasks.get(&parent) {
            Some(p) => current = p,
            None => break,
        }
    }
    current.execution_constraints.as_ref()
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, oid: TaskOid) -> Result<Task, StoreError> {
        self.ensure_available()?;
        self.tasks
            .lock()
            .await
            .get(&oid)
            .cloned()
            .ok_or(StoreError::NotFound { oid })
    }

    async fn modify(
        &self,
        oid: TaskOid,
        delta: TaskDelta,
        precondition: Precondition,
    ) -> Result<Task, StoreError> {
        self.ensure_available()?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&oid).ok_or(StoreError::NotFound { oid })?;

        match precondition {
            Precondition::None => {}
            Precondition::Version(expected) if task.version != expected => {
                return Err(StoreError::Conflict {
                    oid,
                    expected,
                    actual: task.version,
                });
            }
            Precondition::Version(_) => {}
            Precondition::SchedulingState(expected) if task.scheduling_state != expected => {
                return Err(StoreError::PreconditionFailed {
                    oid,
                    reason: format!(
                        "scheduling state is {:?}, expected {:?}",
                        task.scheduling_state, expected
                    ),
                });
            }
            Precondition::SchedulingState(_) => {}
        }

        delta.apply_to(task);
        task.version += 1;
        Ok(task.clone())
    }

    async fn count_running_in_group(
        &self,
        group: &str,
        exclude: TaskOid,
    ) -> Result<usize, StoreError> {
        self.ensure_available()?;
        let tasks = self.tasks.lock().await;
        let count = tasks
            .values()
            .filter(|t| t.oid != exclude && t.execution_state == ExecutionState::Running)
            .filter(|t| {
                effective_constraints(&tasks, t).is_some_and(|c| c.contains_group(group))
            })
            .count();
        Ok(count)
    }

    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.oid) {
            return Err(StoreError::PreconditionFailed {
                oid: task.oid,
                reason: "task already exists".to_string(),
            });
        }
        tasks.insert(task.oid, task);
        Ok(())
    }
}
