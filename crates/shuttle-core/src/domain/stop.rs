//! Stopping a firing early.
//!
//! Every early exit of a firing is a `StopFiring` value travelling up through
//! `Result<_, StopFiring>`. The coordinator turns it into the public
//! `FiringReport` / `FiringError` pair at the very end.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::errors::{HandlerError, ShuttleError};
use super::ids::TaskOid;
use super::result::ResultStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    UnexpectedError,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::UnexpectedError => "unexpected error",
        };
        f.write_str(s)
    }
}

/// Early exit of a firing, with the severity it is reported at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{severity}: {reason}")]
pub struct StopFiring {
    pub severity: Severity,
    pub reason: String,
    pub cause: Option<ShuttleError>,
}

/// A step of a firing that may stop it.
pub type FiringStep<T = ()> = Result<T, StopFiring>;

impl StopFiring {
    pub fn new(severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            severity,
            reason: reason.into(),
            cause: None,
        }
    }

    pub fn info(reason: impl Into<String>) -> Self {
        Self::new(Severity::Info, reason)
    }

    pub fn warning(reason: impl Into<String>) -> Self {
        Self::new(Severity::Warning, reason)
    }

    pub fn error(reason: impl Into<String>, cause: impl Into<ShuttleError>) -> Self {
        Self::new(Severity::Error, reason).with_cause(cause)
    }

    pub fn unexpected(reason: impl Into<String>, cause: impl Into<ShuttleError>) -> Self {
        Self::new(Severity::UnexpectedError, reason).with_cause(cause)
    }

    pub fn with_cause(mut self, cause: impl Into<ShuttleError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Emits the stop at the level matching its severity.
    pub fn log(&self) {
        match (self.severity, &self.cause) {
            (Severity::Info, _) => tracing::info!(reason = %self.reason, "firing stopped"),
            (Severity::Warning, _) => tracing::warn!(reason = %self.reason, "firing stopped"),
            (_, Some(cause)) => {
                tracing::error!(severity = %self.severity, reason = %self.reason, error = %cause, "firing stopped")
            }
            (_, None) => {
                tracing::error!(severity = %self.severity, reason = %self.reason, "firing stopped")
            }
        }
    }

    /// Converts the stop into what `Coordinator::execute` returns.
    ///
    /// Only error-level stops that carry a cause are surfaced as failures.
    pub fn into_outcome(self) -> Result<FiringReport, FiringError> {
        match self.cause {
            Some(cause) if self.severity >= Severity::Error => Err(FiringError::Stopped {
                severity: self.severity,
                reason: self.reason,
                cause,
            }),
            _ => Ok(FiringReport::Halted {
                severity: self.severity,
                reason: self.reason,
            }),
        }
    }
}

/// Benign result of a firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiringReport {
    /// The handler ran; `status` is the recorded result status.
    Completed { oid: TaskOid, status: ResultStatus },
    /// The firing stopped before or instead of running the handler.
    Halted { severity: Severity, reason: String },
}

impl FiringReport {
    pub fn is_completed(&self) -> bool {
        matches!(self, FiringReport::Completed { .. })
    }
}

/// Failure reported back to the trigger engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiringError {
    #[error("firing stopped ({severity}): {reason}")]
    Stopped {
        severity: Severity,
        reason: String,
        #[source]
        cause: ShuttleError,
    },

    #[error("handler of task {oid} failed")]
    Handler {
        oid: TaskOid,
        #[source]
        source: HandlerError,
    },
}
