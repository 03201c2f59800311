//! Lightweight children: in-process, non-persisted work spawned by a handler.
//!
//! Children run as separate tokio tasks and are owned by the parent's
//! `ExecutionHandle`. The firing does not finish before every child has been
//! awaited and closed (`wait_for_children_and_close`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::handle::ExecutionHandle;
use crate::domain::{ChildId, OperationResult, ResultStatus};

/// What a child sees of itself.
#[derive(Debug, Clone)]
pub struct LightweightContext {
    id: ChildId,
    name: String,
    can_run: Arc<AtomicBool>,
}

impl LightweightContext {
    pub fn id(&self) -> ChildId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cooperative stop flag; cleared when the parent is interrupted.
    pub fn can_run(&self) -> bool {
        self.can_run.load(Ordering::SeqCst)
    }

    /// A fresh result node named after this child.
    pub fn new_result(&self) -> OperationResult {
        OperationResult::new(self.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    /// Interrupted by the parent. The waiter no longer blocks on it.
    Cancelled,
    Closed,
}

struct LightweightChild {
    id: ChildId,
    name: String,
    can_run: Arc<AtomicBool>,
    abort: AbortHandle,
    cancel: CancellationToken,
    join: Option<JoinHandle<OperationResult>>,
    state: ChildState,
}

/// A child whose join handle was taken by the waiter.
pub(crate) struct PendingChild {
    pub id: ChildId,
    pub name: String,
    pub join: JoinHandle<OperationResult>,
    pub cancel: CancellationToken,
}

/// Children of one execution handle, in spawn order.
#[derive(Default)]
pub struct ChildSet {
    children: Vec<LightweightChild>,
}

impl ChildSet {
    /// Spawns `work` on the runtime and tracks it.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<F, Fut>(&mut self, id: ChildId, name: String, can_run: bool, work: F)
    where
        F: FnOnce(LightweightContext) -> Fut,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        let flag = Arc::new(AtomicBool::new(can_run));
        let ctx = LightweightContext {
            id,
            name: name.clone(),
            can_run: Arc::clone(&flag),
        };
        let join = tokio::spawn(work(ctx));
        tracing::debug!(child = %id, name = %name, "lightweight child spawned");
        self.children.push(LightweightChild {
            id,
            name,
            can_run: flag,
            abort: join.abort_handle(),
            cancel: CancellationToken::new(),
            join: Some(join),
            state: ChildState::Running,
        });
    }

    /// Cancels every running child: clears its `can_run`, marks it
    /// cancelled and, with `abort`, also aborts its tokio task.
    /// Returns how many children were cancelled.
    pub fn cancel(&mut self, abort: bool) -> usize {
        let mut cancelled = 0;
        for child in self
            .children
            .iter_mut()
            .filter(|c| c.state == ChildState::Running)
        {
            child.can_run.store(false, Ordering::SeqCst);
            child.state = ChildState::Cancelled;
            child.cancel.cancel();
            if abort {
                child.abort.abort();
            }
            cancelled += 1;
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn running(&self) -> usize {
        self.children
            .iter()
            .filter(|c| c.state == ChildState::Running)
            .count()
    }

    pub fn states(&self) -> Vec<(ChildId, ChildState)> {
        self.children.iter().map(|c| (c.id, c.state)).collect()
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingChild> {
        self.children
            .iter_mut()
            .filter_map(|c| {
                c.join.take().map(|join| PendingChild {
                    id: c.id,
                    name: c.name.clone(),
                    join,
                    cancel: c.cancel.clone(),
                })
            })
            .collect()
    }

    pub(crate) fn close(&mut self, id: ChildId) {
        if let Some(child) = self.children.iter_mut().find(|c| c.id == id) {
            child.state = ChildState::Closed;
        }
    }
}

/// Blocks until every child of `handle` has completed or been cancelled,
/// closes them and appends their results to `result`. Children spawned while
/// waiting are waited for too. Returns the number of children closed.
///
/// A cancelled child that has not finished yet is closed as interrupted and
/// left to wind down on its own.
pub async fn wait_for_children_and_close(
    handle: &ExecutionHandle,
    result: &mut OperationResult,
) -> usize {
    let mut closed = 0;
    loop {
        let pending = handle.take_pending_children();
        if pending.is_empty() {
            break;
        }
        for mut child in pending {
            tracing::trace!(child = %child.id, "waiting for lightweight child");
            let child_result = tokio::select! {
                biased;
                joined = &mut child.join => match joined {
                    Ok(r) => r,
                    Err(e) => failed_child_result(&child.name, e),
                },
                _ = child.cancel.cancelled() => cancelled_child_result(&child.name),
            };
            handle.close_child(child.id);
            result.add_subresult(child_result);
            closed += 1;
        }
    }
    if closed > 0 {
        tracing::debug!(oid = %handle.oid(), closed, "lightweight children closed");
    }
    closed
}

fn cancelled_child_result(name: &str) -> OperationResult {
    let mut r = OperationResult::new(name);
    r.record(
        ResultStatus::Interrupted,
        Some("lightweight child was cancelled".to_string()),
    );
    r
}

fn failed_child_result(name: &str, err: JoinError) -> OperationResult {
    if err.is_cancelled() {
        return cancelled_child_result(name);
    }
    tracing::error!(child = name, error = %err, "lightweight child panicked");
    let mut r = OperationResult::new(name);
    r.record_fatal(format!("lightweight child panicked: {err}"));
    r
}
