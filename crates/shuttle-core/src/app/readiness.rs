//! Readiness gate.

use crate::domain::{FiringStep, StopFiring, Task};
use crate::ports::TriggerEngine;

/// Stops a firing of a task that is not READY and removes its stale trigger.
///
/// Such firings come from a race with the administrative layer (the task was
/// suspended or closed after its trigger was already due).
pub async fn ensure_ready(trigger: &dyn TriggerEngine, task: &Task) -> FiringStep {
    if task.is_ready() {
        return Ok(());
    }

    if let Err(e) = trigger.unschedule(task.oid).await {
        return Err(StopFiring::unexpected(
            format!("couldn't unschedule task {task} that is not ready"),
            e,
        ));
    }
    Err(StopFiring::warning(format!(
        "task {task} is not ready (scheduling state {:?}); its trigger was removed",
        task.scheduling_state
    )))
}
