//! Thread-stop decision table.
//!
//! The same table is consulted in two places: when a firing is a recovery of an
//! interrupted run, and when a running firing was stopped from outside. Both go
//! through `resolve_thread_stop` so the two cannot drift apart.
//!
//! This is a pure function: no I/O, no state mutation.

use super::errors::PolicyError;
use super::state::{Binding, ThreadStopAction};

/// Where the table is being consulted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopContext {
    /// Firing recovers a run whose owner died.
    Recovering,
    /// A running firing was stopped from outside.
    Halting,
}

/// What to do with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDirective {
    Close,
    /// Suspend without waiting for the running thread (which is us).
    Suspend,
    /// Recovering: carry on and run the handler now.
    Resume,
    /// Halting: make the trigger fire again immediately.
    RescheduleNow,
    /// Stop here; the trigger engine re-fires a loose recurring task by itself.
    AwaitNaturalRefire,
}

/// Decides how a stopped or recovering task continues.
///
/// # Example
/// ```
/// use shuttle_core::domain::{resolve_thread_stop, Binding, StopContext, StopDirective, ThreadStopAction};
///
/// let d = resolve_thread_stop(Some(&ThreadStopAction::Restart), StopContext::Halting, false, Binding::Tight);
/// assert_eq!(d.unwrap(), StopDirective::RescheduleNow);
/// ```
pub fn resolve_thread_stop(
    action: Option<&ThreadStopAction>,
    context: StopContext,
    recurring: bool,
    binding: Binding,
) -> Result<StopDirective, PolicyError> {
    let run_again = match context {
        StopContext::Recovering => StopDirective::Resume,
        StopContext::Halting => StopDirective::RescheduleNow,
    };

    match action {
        Some(ThreadStopAction::Close) => Ok(StopDirective::Close),
        Some(ThreadStopAction::Suspend) => Ok(StopDirective::Suspend),
        None | Some(ThreadStopAction::Restart) => Ok(run_again),
        Some(ThreadStopAction::Reschedule) => {
            if recurring && binding == Binding::Loose {
                Ok(StopDirective::AwaitNaturalRefire)
            } else {
                // next fire time of a tight task is unknown, run it now
                Ok(run_again)
            }
        }
        Some(ThreadStopAction::Unrecognized(raw)) => {
            Err(PolicyError::UnknownThreadStopAction(raw.clone()))
        }
    }
}
