//! Handler ports: the user-supplied task logic and how it is looked up.

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::firing::RunContext;
use crate::domain::{HandlerError, HandlerOutcome, HandlerRef};

/// Logic executed by a firing.
///
/// Cancellation is cooperative: long-running handlers should poll
/// `ctx.can_run()` and return `HandlerOutcome::interrupted()` once it turns
/// false.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError>;

    /// True if the handler may be left running without a hard interrupt under
    /// `InterruptPolicy::Maybe`.
    fn safe_without_interrupt(&self) -> bool {
        false
    }
}

/// Resolves a `HandlerRef` to handler logic.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, handler_ref: &HandlerRef) -> Option<Arc<dyn TaskHandler>>;
}
