//! Stop-policy resolver, run at the end of a firing that was stopped from
//! outside (node shutdown, scheduler stop, deactivation).

use crate::domain::{StopContext, StopDirective, StoreError, TaskOid, resolve_thread_stop};
use crate::ports::TaskStore;

use super::state_manager::StateManager;

/// Applies the task's thread-stop action. Errors are logged, never propagated.
///
/// A task that is no longer READY was suspended or closed on purpose, so its
/// thread-stop action does not apply.
pub async fn process_task_stop(store: &dyn TaskStore, states: &StateManager, oid: TaskOid) {
    let task = match store.get(oid).await {
        Ok(t) => t,
        Err(StoreError::NotFound { .. }) => {
            tracing::debug!(%oid, "stopped task no longer exists");
            return;
        }
        Err(e) => {
            tracing::error!(%oid, error = %e, "couldn't refresh stopped task");
            return;
        }
    };

    if !task.is_ready() {
        tracing::trace!(
            %oid,
            scheduling_state = ?task.scheduling_state,
            "task is not ready, thread stop action does not apply"
        );
        return;
    }

    let directive = match resolve_thread_stop(
        task.thread_stop_action.as_ref(),
        StopContext::Halting,
        task.recurring,
        task.binding,
    ) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(%oid, error = %e, "can't apply thread stop action");
            return;
        }
    };

    let outcome = match directive {
        StopDirective::Close => {
            tracing::info!(task = %task, "closing non-resilient task on node shutdown");
            states.close(oid).await.map(|_| ())
        }
        StopDirective::Suspend => {
            tracing::info!(task = %task, "suspending non-resilient task on node shutdown");
            states.suspend_no_wait(oid).await.map(|_| ())
        }
        StopDirective::RescheduleNow | StopDirective::Resume => {
            tracing::info!(task = %task, "node going down: rescheduling resilient task to run immediately");
            states.schedule_now(oid).await
        }
        StopDirective::AwaitNaturalRefire => {
            tracing::debug!(task = %task, "loose recurring task will be re-fired by its trigger");
            Ok(())
        }
    };

    if let Err(e) = outcome {
        tracing::error!(%oid, error = %e, ?directive, "couldn't apply thread stop action");
    }
}
