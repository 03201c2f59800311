//! Operation results and handler outcomes.

use serde::{Deserialize, Serialize};

/// Status of an `OperationResult` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    InProgress,
    Success,
    PartialError,
    FatalError,
    Interrupted,
}

/// Outcome tree recorded on a task.
///
/// # Example
/// ```
/// use shuttle_core::domain::{OperationResult, ResultStatus};
///
/// let mut result = OperationResult::new("firing");
/// let mut child = OperationResult::new("child");
/// child.record_fatal("boom");
/// result.add_subresult(child);
/// result.record_success();
///
/// assert_eq!(result.status, ResultStatus::Success);
/// assert_eq!(result.subresults.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subresults: Vec<OperationResult>,
}

impl OperationResult {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: ResultStatus::InProgress,
            message: None,
            subresults: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.status = ResultStatus::Success;
    }

    pub fn record_fatal(&mut self, message: impl Into<String>) {
        self.record(ResultStatus::FatalError, Some(message.into()));
    }

    pub fn record(&mut self, status: ResultStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
    }

    pub fn add_subresult(&mut self, subresult: OperationResult) {
        self.subresults.push(subresult);
    }

    /// Settles a still-open result from its subresults.
    pub fn compute_status(&mut self) {
        if self.status != ResultStatus::InProgress {
            return;
        }
        let has_failure = self.subresults.iter().any(|r| {
            matches!(
                r.status,
                ResultStatus::FatalError | ResultStatus::PartialError
            )
        });
        self.status = if has_failure {
            ResultStatus::PartialError
        } else {
            ResultStatus::Success
        };
    }

    pub fn is_fatal(&self) -> bool {
        self.status == ResultStatus::FatalError
    }
}

/// How a handler run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The work is done.
    Finished,
    /// Failed, but a later run may succeed.
    TemporaryError,
    /// Failed in a way that further runs cannot fix.
    PermanentError,
    /// Stopped early because `can_run` was cleared.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub status: RunStatus,
    pub message: Option<String>,
}

impl HandlerOutcome {
    pub fn finished() -> Self {
        Self {
            status: RunStatus::Finished,
            message: None,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            status: RunStatus::Interrupted,
            message: None,
        }
    }

    pub fn temporary_error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::TemporaryError,
            message: Some(message.into()),
        }
    }

    pub fn permanent_error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::PermanentError,
            message: Some(message.into()),
        }
    }

    pub fn result_status(&self) -> ResultStatus {
        match self.status {
            RunStatus::Finished => ResultStatus::Success,
            RunStatus::TemporaryError => ResultStatus::PartialError,
            RunStatus::PermanentError => ResultStatus::FatalError,
            RunStatus::Interrupted => ResultStatus::Interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_result_settles_from_subresults() {
        let mut result = OperationResult::new("firing");
        let mut ok = OperationResult::new("a");
        ok.record_success();
        result.add_subresult(ok.clone());
        result.compute_status();
        assert_eq!(result.status, ResultStatus::Success);

        let mut failing = OperationResult::new("firing");
        let mut bad = OperationResult::new("b");
        bad.record_fatal("boom");
        failing.add_subresult(ok);
        failing.add_subresult(bad);
        failing.compute_status();
        assert_eq!(failing.status, ResultStatus::PartialError);
    }

    #[test]
    fn settled_result_is_not_recomputed() {
        let mut result = OperationResult::new("firing");
        result.record(ResultStatus::Interrupted, None);
        result.compute_status();
        assert_eq!(result.status, ResultStatus::Interrupted);
    }
}
