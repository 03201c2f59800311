//! ExecutionHandle - in-memory state of one firing.
//!
//! Shared between the firing itself and whoever wants to stop it
//! (`Coordinator::interrupt`, node deactivation). Everything touched from both
//! sides is atomic or behind a mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::children::{ChildSet, ChildState, LightweightContext, PendingChild};
use crate::domain::{ChildId, OperationResult, TaskOid};
use crate::ports::IdGenerator;

pub struct ExecutionHandle {
    oid: TaskOid,
    can_run: AtomicBool,
    /// Hard interrupt of the main handler future.
    interrupt: CancellationToken,
    safe_without_interrupt: AtomicBool,
    executing: AtomicBool,
    children: Mutex<ChildSet>,
    ids: Arc<dyn IdGenerator>,
}

impl ExecutionHandle {
    pub fn new(oid: TaskOid, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            oid,
            can_run: AtomicBool::new(true),
            interrupt: CancellationToken::new(),
            safe_without_interrupt: AtomicBool::new(false),
            executing: AtomicBool::new(false),
            children: Mutex::new(ChildSet::default()),
            ids,
        }
    }

    pub fn oid(&self) -> TaskOid {
        self.oid
    }

    pub fn can_run(&self) -> bool {
        self.can_run.load(Ordering::SeqCst)
    }

    pub fn unset_can_run(&self) {
        self.can_run.store(false, Ordering::SeqCst);
    }

    /// Cancels the main handler future at its next await point.
    pub fn interrupt_main(&self) {
        self.interrupt.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Resolves once `interrupt_main` has been called.
    pub fn interrupted(&self) -> WaitForCancellationFuture<'_> {
        self.interrupt.cancelled()
    }

    pub fn set_safe_without_interrupt(&self, safe: bool) {
        self.safe_without_interrupt.store(safe, Ordering::SeqCst);
    }

    pub fn is_safe_without_interrupt(&self) -> bool {
        self.safe_without_interrupt.load(Ordering::SeqCst)
    }

    /// Marks whether the handler is currently being executed.
    pub fn set_executing(&self, executing: bool) {
        self.executing.store(executing, Ordering::SeqCst);
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    /// Starts a lightweight child. It inherits the parent's current `can_run`.
    ///
    /// # Example
    /// ```
    /// # use std::sync::Arc;
    /// # use shuttle_core::app::ExecutionHandle;
    /// # use shuttle_core::domain::{OperationResult, TaskOid};
    /// # use shuttle_core::ports::{SystemClock, UlidGenerator};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let handle = ExecutionHandle::new(TaskOid::from_ulid(ulid::Ulid::new()), Arc::new(UlidGenerator::new(SystemClock)));
    /// handle.spawn_lightweight("partition-1", |ctx| async move {
    ///     let mut r = ctx.new_result();
    ///     r.record_success();
    ///     r
    /// });
    /// assert_eq!(handle.running_children(), 1);
    /// # }
    /// ```
    pub fn spawn_lightweight<F, Fut>(&self, name: impl Into<String>, work: F) -> ChildId
    where
        F: FnOnce(LightweightContext) -> Fut,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        let id = self.ids.generate_child_id();
        let mut children = self.children();
        // read under the lock so a concurrent interrupt either sees this child or we see its flag
        children.spawn(id, name.into(), self.can_run(), work);
        id
    }

    /// See `ChildSet::cancel`.
    pub fn cancel_children(&self, abort: bool) -> usize {
        self.children().cancel(abort)
    }

    pub fn child_states(&self) -> Vec<(ChildId, ChildState)> {
        self.children().states()
    }

    pub fn running_children(&self) -> usize {
        self.children().running()
    }

    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    pub(crate) fn take_pending_children(&self) -> Vec<PendingChild> {
        self.children().take_pending()
    }

    pub(crate) fn close_child(&self, id: ChildId) {
        self.children().close(id);
    }

    fn children(&self) -> MutexGuard<'_, ChildSet> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("oid", &self.oid)
            .field("can_run", &self.can_run())
            .field("interrupted", &self.is_interrupted())
            .field("executing", &self.is_executing())
            .finish()
    }
}
