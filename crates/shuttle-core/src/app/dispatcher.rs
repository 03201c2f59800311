//! Handler dispatcher: resolve, run, and apply what the handler reported.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::firing::RunContext;
use super::handle::ExecutionHandle;
use super::state_manager::StateManager;
use crate::domain::{
    FiringStep, HandlerError, HandlerOutcome, OperationResult, RunStatus, ShuttleError, StopFiring,
    Task,
};
use crate::ports::{HandlerResolver, TaskHandler};

/// Looks the handler up. A missing handler is a configuration error: the
/// fatal result is written into the task, the task is closed, and the firing
/// stops as unexpected.
pub async fn resolve_handler(
    resolver: &dyn HandlerResolver,
    states: &StateManager,
    task: &Task,
    result: &mut OperationResult,
) -> FiringStep<Arc<dyn TaskHandler>> {
    if let Some(handler) = resolver.resolve(&task.handler_ref) {
        return Ok(handler);
    }

    let reason = format!(
        "no handler registered for {}, closing task {task}",
        task.handler_ref
    );
    result.record_fatal(reason.clone());
    if let Err(e) = states.record_result(task.oid, result).await {
        tracing::error!(oid = %task.oid, error = %e, "couldn't record result of flawed task");
    }
    if let Err(e) = states.close(task.oid).await {
        tracing::error!(oid = %task.oid, error = %e, "couldn't close flawed task");
    }
    Err(StopFiring::unexpected(
        reason,
        ShuttleError::HandlerNotFound(task.handler_ref.to_string()),
    ))
}

/// Runs the handler until it returns, panics or is hard-interrupted.
///
/// A hard interrupt drops the handler future at its next await point and is
/// reported as an interrupted run.
pub async fn run_handler(
    handler: &dyn TaskHandler,
    handle: &ExecutionHandle,
    ctx: &RunContext<'_>,
) -> Result<HandlerOutcome, HandlerError> {
    tokio::select! {
        biased;
        _ = handle.interrupted() => {
            tracing::info!(oid = %handle.oid(), "handler interrupted");
            Ok(HandlerOutcome::interrupted())
        }
        run = AssertUnwindSafe(handler.run(ctx)).catch_unwind() => match run {
            Ok(outcome) => outcome,
            Err(panic) => Err(HandlerError::Panicked(panic_message(&*panic))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Records the run into `result`, persists it, and closes or suspends the
/// task where the outcome calls for it. A task the handler moved out of
/// READY keeps its state. Failures are logged.
pub async fn apply_outcome(
    states: &StateManager,
    task: &Task,
    run: &Result<HandlerOutcome, HandlerError>,
    result: &mut OperationResult,
) {
    let outcome = match run {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(task = %task, error = %e, "handler failed");
            result.record_fatal(e.to_string());
            persist(states, task, result).await;
            return;
        }
    };

    tracing::debug!(task = %task, status = ?outcome.status, "handler returned");
    result.record(outcome.result_status(), outcome.message.clone());
    let Some(current) = persist(states, task, result).await else {
        return;
    };
    if !current.is_ready() {
        tracing::debug!(
            task = %task,
            scheduling_state = ?current.scheduling_state,
            "task left READY during the run, keeping its state"
        );
        return;
    }

    let applied = match outcome.status {
        RunStatus::Finished | RunStatus::TemporaryError if !task.recurring => {
            states.close(task.oid).await.map(|_| ())
        }
        RunStatus::PermanentError => {
            tracing::warn!(task = %task, message = ?outcome.message, "permanent error, suspending task");
            states.suspend_no_wait(task.oid).await.map(|_| ())
        }
        _ => Ok(()),
    };
    if let Err(e) = applied {
        tracing::error!(oid = %task.oid, error = %e, status = ?outcome.status, "couldn't apply run result");
    }
}

async fn persist(states: &StateManager, task: &Task, result: &OperationResult) -> Option<Task> {
    match states.record_result(task.oid, result).await {
        Ok(current) => Some(current),
        Err(e) => {
            tracing::error!(oid = %task.oid, error = %e, "couldn't record operation result");
            None
        }
    }
}
