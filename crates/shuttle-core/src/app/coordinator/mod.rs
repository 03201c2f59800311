//! Coordinator - 1 回の firing を最初から最後まで実行する
//!
//! # フロー
//! 1. snapshot 取得（消えていれば job 削除）
//! 2. READY でなければ trigger を外して終了
//! 3. 実行情報の修復（古い node / RUNNING を消す）
//! 4. ローカル scheduler の停止チェック
//! 5. recovering の場合は thread-stop action を適用
//! 6. group 上限による admission control
//! 7. 排他チェック → RUNNING へ → handler 実行 → 結果の適用
//! 8. 後始末: node のクリア、停止ポリシー、子タスクの待機
//!
//! 途中で止まる経路はすべて `StopFiring` として返り、最後に
//! `FiringReport` / `FiringError` に変換されます。

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;

use super::admission::AdmissionController;
use super::children::wait_for_children_and_close;
use super::config::CoordinatorConfig;
use super::dispatcher::{apply_outcome, resolve_handler, run_handler};
use super::exclusivity::{concurrent_execution, ensure_not_running_elsewhere};
use super::execution_state::{finalize, start_running};
use super::firing::{FIRING_OPERATION, Firing, RunContext};
use super::handle::ExecutionHandle;
use super::interrupt::{ShutdownCoordinator, interrupt};
use super::readiness::ensure_ready;
use super::recovery::{apply_recovery_policy, repair_execution_info};
use super::running::RunningTasks;
use super::snapshot;
use super::state_manager::StateManager;
use super::stop_policy::process_task_stop;
use crate::domain::{
    FiringError, FiringReport, FiringStep, HandlerError, OperationResult, StopFiring, Task, TaskOid,
};
use crate::ports::{
    Clock, HandlerResolver, IdGenerator, SecurityContextManager, SecurityScope, SystemClock,
    TaskListener, TaskStore, TriggerEngine, UlidGenerator,
};

#[cfg(test)]
mod tests;

/// Runs firings delivered by the trigger engine on the local node.
///
/// Every collaborator is passed in explicitly; see [`CoordinatorBuilder`].
pub struct Coordinator {
    config: CoordinatorConfig,
    store: Arc<dyn TaskStore>,
    trigger: Arc<dyn TriggerEngine>,
    handlers: Arc<dyn HandlerResolver>,
    listeners: Vec<Arc<dyn TaskListener>>,
    security: Arc<dyn SecurityContextManager>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    running: Arc<RunningTasks>,
    shutdown: ShutdownCoordinator,
    states: StateManager,
}

impl Coordinator {
    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Executes one firing of `oid`.
    ///
    /// `recovering` is set by the trigger engine when the node that owned the
    /// previous run died without a clean shutdown.
    pub async fn execute(
        &self,
        oid: TaskOid,
        recovering: bool,
    ) -> Result<FiringReport, FiringError> {
        let span = tracing::info_span!("firing", oid = %oid, recovering);
        self.fire(oid, recovering).instrument(span).await
    }

    /// Interrupts the local execution of `oid`, if any.
    pub fn interrupt(&self, oid: TaskOid) -> bool {
        match self.running.get(oid) {
            Some(handle) => {
                interrupt(&handle, self.config.interrupt_policy);
                true
            }
            None => {
                tracing::debug!(%oid, "interrupt requested for a task not running here");
                false
            }
        }
    }

    /// Stops every firing on this node. Firings that start afterwards are
    /// interrupted as soon as they register.
    pub fn deactivate(&self) -> usize {
        self.shutdown.deactivate()
    }

    pub fn is_deactivated(&self) -> bool {
        self.shutdown.is_deactivated()
    }

    /// OIDs currently executing on this node.
    pub fn running_tasks(&self) -> Vec<TaskOid> {
        self.running.list()
    }

    pub fn running_handle(&self, oid: TaskOid) -> Option<Arc<ExecutionHandle>> {
        self.running.get(oid)
    }

    async fn fire(&self, oid: TaskOid, recovering: bool) -> Result<FiringReport, FiringError> {
        let firing = match self.prepare(oid, recovering).await {
            Ok(firing) => firing,
            Err(stop) => return halt(stop),
        };
        self.run(firing).await
    }

    /// Everything before the exclusivity guard: nothing here sets the node.
    async fn prepare(&self, oid: TaskOid, recovering: bool) -> FiringStep<Firing> {
        let snapshot = snapshot::load(&*self.store, &*self.trigger, oid).await?;
        ensure_ready(&*self.trigger, &snapshot.task).await?;

        let task = repair_execution_info(
            &*self.store,
            &self.running,
            &self.config.node_id,
            snapshot.task,
            recovering,
        )
        .await?;

        self.ensure_local_scheduler_running(&task).await?;
        apply_recovery_policy(&self.states, &task, recovering).await?;

        AdmissionController {
            store: &*self.store,
            trigger: &*self.trigger,
            clock: &*self.clock,
            config: &self.config,
        }
        .enforce(&task, snapshot.constraints.as_ref())
        .await?;

        Ok(Firing {
            handle: Arc::new(ExecutionHandle::new(oid, Arc::clone(&self.ids))),
            task,
            constraints: snapshot.constraints,
            root_oid: snapshot.root_oid,
            recovering,
            result: OperationResult::new(FIRING_OPERATION),
            node_set: false,
        })
    }

    async fn ensure_local_scheduler_running(&self, task: &Task) -> FiringStep {
        if self.trigger.is_running().await {
            return Ok(());
        }
        process_task_stop(&*self.store, &self.states, task.oid).await;
        Err(StopFiring::warning(format!(
            "local scheduler is not running, task {task} not started"
        )))
    }

    async fn run(&self, mut firing: Firing) -> Result<FiringReport, FiringError> {
        let oid = firing.oid();
        if let Err(stop) = ensure_not_running_elsewhere(
            &*self.store,
            self.config.check_concurrent_execution,
            &firing.task,
        )
        .await
        {
            return halt(stop);
        }

        let Some(registration) = self.running.register(Arc::clone(&firing.handle)) else {
            return halt(concurrent_execution(
                &firing.task,
                self.config.node_id.clone(),
            ));
        };
        if self.shutdown.is_deactivated() {
            interrupt(registration.handle(), self.config.interrupt_policy);
        }
        tracing::trace!(root = %firing.root_oid, "firing registered");

        let step = self.run_registered(&mut firing).await;
        self.clean_up(&mut firing).await;
        drop(registration);

        match step {
            Ok(Ok(())) => Ok(FiringReport::Completed {
                oid,
                status: firing.result.status,
            }),
            Ok(Err(source)) => Err(FiringError::Handler { oid, source }),
            Err(stop) => halt(stop),
        }
    }

    /// RUNNING → handler → result. The outer step is an early stop, the inner
    /// one a handler failure that has already been recorded.
    async fn run_registered(&self, firing: &mut Firing) -> FiringStep<Result<(), HandlerError>> {
        firing.task = start_running(&*self.store, &firing.task, &self.config.node_id).await?;
        firing.node_set = true;

        let handler =
            resolve_handler(&*self.handlers, &self.states, &firing.task, &mut firing.result)
                .await?;
        firing
            .handle
            .set_safe_without_interrupt(handler.safe_without_interrupt());

        tracing::debug!(task = %firing.task, recovering = firing.recovering, "task thread run STARTING");
        for listener in &self.listeners {
            listener.on_thread_start(&firing.task, firing.recovering);
        }

        let run = {
            let _scope = SecurityScope::enter(&*self.security, firing.task.owner.as_deref());
            let ctx = RunContext::new(
                &firing.task,
                &firing.handle,
                &*self.store,
                firing.recovering,
            );
            firing.handle.set_executing(true);
            let run = run_handler(&*handler, &firing.handle, &ctx).await;
            firing.handle.set_executing(false);
            run
        };

        wait_for_children_and_close(&firing.handle, &mut firing.result).await;
        apply_outcome(&self.states, &firing.task, &run, &mut firing.result).await;

        Ok(run.map(|_| ()))
    }

    /// Runs on every exit path once the firing is registered.
    async fn clean_up(&self, firing: &mut Firing) {
        let oid = firing.oid();
        firing.handle.set_executing(false);

        if firing.node_set {
            tracing::debug!(task = %firing.task, "task thread run FINISHED");
            for listener in &self.listeners {
                listener.on_thread_finish(&firing.task, &firing.result);
            }
            finalize(&*self.store, oid).await;
        }

        if !firing.handle.can_run() {
            process_task_stop(&*self.store, &self.states, oid).await;
        }

        // children spawned after the handler returned, or left by an early stop
        let closed = wait_for_children_and_close(&firing.handle, &mut firing.result).await;
        if closed > 0
            && let Err(e) = self.states.record_result(oid, &firing.result).await
        {
            tracing::error!(%oid, error = %e, "couldn't record results of late children");
        }
    }
}

fn halt(stop: StopFiring) -> Result<FiringReport, FiringError> {
    stop.log();
    stop.into_outcome()
}

/// BuildError はコーディネーター構築時のエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing collaborator: {0}. It must be set before build().")]
    Missing(&'static str),
}

/// Wires a [`Coordinator`] together.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use shuttle_core::app::{Coordinator, CoordinatorConfig};
/// use shuttle_core::impls::{
///     HandlerRegistry, InMemorySecurityContext, InMemoryTaskStore, InMemoryTriggerEngine,
/// };
///
/// let coordinator = Coordinator::builder(CoordinatorConfig::default())
///     .store(Arc::new(InMemoryTaskStore::new()))
///     .trigger(Arc::new(InMemoryTriggerEngine::new()))
///     .handlers(Arc::new(HandlerRegistry::new()))
///     .security(Arc::new(InMemorySecurityContext::new()))
///     .build()
///     .unwrap();
/// assert!(coordinator.running_tasks().is_empty());
/// ```
///
/// `store`, `trigger`, `handlers` and `security` are required. The clock
/// and id generator default to the system clock.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    store: Option<Arc<dyn TaskStore>>,
    trigger: Option<Arc<dyn TriggerEngine>>,
    handlers: Option<Arc<dyn HandlerResolver>>,
    listeners: Vec<Arc<dyn TaskListener>>,
    security: Option<Arc<dyn SecurityContextManager>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl CoordinatorBuilder {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            store: None,
            trigger: None,
            handlers: None,
            listeners: Vec::new(),
            security: None,
            clock: None,
            ids: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn trigger(mut self, trigger: Arc<dyn TriggerEngine>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn handlers(mut self, handlers: Arc<dyn HandlerResolver>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn security(mut self, security: Arc<dyn SecurityContextManager>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Coordinator, BuildError> {
        let store = self.store.ok_or(BuildError::Missing("store"))?;
        let trigger = self.trigger.ok_or(BuildError::Missing("trigger"))?;
        let handlers = self.handlers.ok_or(BuildError::Missing("handlers"))?;
        let security = self.security.ok_or(BuildError::Missing("security"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        let running = Arc::new(RunningTasks::new());
        let shutdown = ShutdownCoordinator::new(Arc::clone(&running), self.config.interrupt_policy);
        let states = StateManager::new(
            Arc::clone(&store),
            Arc::clone(&trigger),
            Arc::clone(&clock),
        );

        tracing::debug!(node = %self.config.node_id, listeners = self.listeners.len(), "coordinator built");
        Ok(Coordinator {
            config: self.config,
            store,
            trigger,
            handlers,
            listeners: self.listeners,
            security,
            clock,
            ids,
            running,
            shutdown,
            states,
        })
    }
}
