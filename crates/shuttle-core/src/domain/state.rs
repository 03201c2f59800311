//! Task states and per-task policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::PolicyError;

/// Scheduling state: governs whether the trigger engine may fire the task.
///
/// State transitions:
/// - Ready -> Suspended -> Ready (administrative suspend / resume)
/// - Ready -> Waiting -> Ready (handler waits for something, then is woken)
/// - any -> Closed (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulingState {
    Ready,
    Waiting,
    Suspended,
    Closed,
}

/// Execution state: governs whether a firing is currently live.
///
/// `Running` implies the task has an assigned node and it is the node that runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Runnable,
    Running,
    Waiting,
    Suspended,
    Closed,
}

/// Whether a recurring task's next run is scheduled independently of the
/// current run (loose) or only after it completes (tight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Binding {
    Tight,
    #[default]
    Loose,
}

/// What to do with a task whose execution was abnormally stopped
/// (node shutdown, process crash, cluster-wide deactivation).
///
/// Values are stored as strings; anything unrecognised is kept verbatim in
/// `Unrecognized` so that the decision point can fail loudly instead of the
/// whole task becoming unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThreadStopAction {
    Close,
    Suspend,
    Restart,
    Reschedule,
    Unrecognized(String),
}

impl ThreadStopAction {
    pub fn as_str(&self) -> &str {
        match self {
            ThreadStopAction::Close => "CLOSE",
            ThreadStopAction::Suspend => "SUSPEND",
            ThreadStopAction::Restart => "RESTART",
            ThreadStopAction::Reschedule => "RESCHEDULE",
            ThreadStopAction::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for ThreadStopAction {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "CLOSE" => ThreadStopAction::Close,
            "SUSPEND" => ThreadStopAction::Suspend,
            "RESTART" => ThreadStopAction::Restart,
            "RESCHEDULE" => ThreadStopAction::Reschedule,
            _ => ThreadStopAction::Unrecognized(raw),
        }
    }
}

impl From<ThreadStopAction> for String {
    fn from(action: ThreadStopAction) -> Self {
        action.as_str().to_string()
    }
}

impl FromStr for ThreadStopAction {
    type Err = PolicyError;

    /// Strict parse, for configuration input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match ThreadStopAction::from(s.to_string()) {
            ThreadStopAction::Unrecognized(raw) => Err(PolicyError::UnknownThreadStopAction(raw)),
            known => Ok(known),
        }
    }
}

impl fmt::Display for ThreadStopAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
