//! Errors - エラー型と分類
//!
//! Each port has its own error enum; `ShuttleError` is the umbrella type that a
//! stopped firing carries as its cause.

use thiserror::Error;

use super::ids::{NodeId, TaskOid};

/// Errors reported by a `TaskStore`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The task no longer exists.
    #[error("task {oid} not found")]
    NotFound { oid: TaskOid },

    /// A state precondition on a modify did not hold.
    #[error("precondition failed for {oid}: {reason}")]
    PreconditionFailed { oid: TaskOid, reason: String },

    /// Optimistic version check failed.
    #[error("version conflict for {oid}: expected {expected}, actual {actual}")]
    Conflict {
        oid: TaskOid,
        expected: u64,
        actual: u64,
    },

    #[error("task store backend error: {0}")]
    Backend(String),
}

/// Errors reported by a `TriggerEngine`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("trigger engine error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("unknown thread stop action: {0}")]
    UnknownThreadStopAction(String),
}

/// Failure raised by handler logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate handler for handler_ref={0}")]
    DuplicateHandler(String),
}

/// Cause attached to a stopped firing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShuttleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("no handler registered for handler_ref={0}")]
    HandlerNotFound(String),

    #[error("task {oid} is already running on node {node}")]
    ConcurrentExecution { oid: TaskOid, node: NodeId },
}
