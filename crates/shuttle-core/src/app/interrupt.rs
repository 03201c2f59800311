//! Shutdown / interrupt coordination.
//!
//! Stop requests arrive from a different context than the one running the
//! handler. They are delivered through the handle's atomics and cancellation
//! token; nothing here awaits.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::handle::ExecutionHandle;
use super::running::RunningTasks;

/// When to hard-interrupt the main handler in addition to clearing `can_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPolicy {
    Always,
    /// Unless the handler is safe without interrupt.
    Maybe,
    #[default]
    Never,
}

impl FromStr for InterruptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(InterruptPolicy::Always),
            "maybe" => Ok(InterruptPolicy::Maybe),
            "never" => Ok(InterruptPolicy::Never),
            other => Err(format!("unknown interrupt policy: {other}")),
        }
    }
}

impl fmt::Display for InterruptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterruptPolicy::Always => "always",
            InterruptPolicy::Maybe => "maybe",
            InterruptPolicy::Never => "never",
        };
        f.write_str(s)
    }
}

/// Asks a running firing to stop.
///
/// 1. clears the handle's `can_run`
/// 2. cancels every live child; unless the policy is `Never` its tokio task is aborted too
/// 3. hard-interrupts the main handler if the policy says so
pub fn interrupt(handle: &ExecutionHandle, policy: InterruptPolicy) {
    tracing::trace!(oid = %handle.oid(), %policy, executing = handle.is_executing(), "interrupting task");
    handle.unset_can_run();

    let cancelled = handle.cancel_children(policy != InterruptPolicy::Never);
    if cancelled > 0 {
        tracing::debug!(oid = %handle.oid(), children = cancelled, "lightweight children cancelled");
    }

    let interrupt_main = match policy {
        InterruptPolicy::Always => true,
        InterruptPolicy::Maybe => !handle.is_safe_without_interrupt(),
        InterruptPolicy::Never => false,
    };
    if interrupt_main {
        handle.interrupt_main();
    }
}

/// Node-wide stop signal ("deactivate all task threads").
pub struct ShutdownCoordinator {
    token: CancellationToken,
    running: Arc<RunningTasks>,
    policy: InterruptPolicy,
}

impl ShutdownCoordinator {
    pub fn new(running: Arc<RunningTasks>, policy: InterruptPolicy) -> Self {
        Self {
            token: CancellationToken::new(),
            running,
            policy,
        }
    }

    /// Cancels the node token and interrupts every running firing.
    /// Returns the number of firings interrupted.
    pub fn deactivate(&self) -> usize {
        self.token.cancel();
        let handles = self.running.handles();
        for handle in &handles {
            interrupt(handle, self.policy);
        }
        tracing::info!(interrupted = handles.len(), "task threads deactivated");
        handles.len()
    }

    pub fn is_deactivated(&self) -> bool {
        self.token.is_cancelled()
    }
}
