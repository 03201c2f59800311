use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rstest::rstest;
use tokio::sync::{Barrier, Notify};
use ulid::Ulid;

use super::*;
use crate::app::interrupt::InterruptPolicy;
use crate::domain::{
    ExecutionConstraints, ExecutionState, HandlerOutcome, HandlerRef, NodeId, ResultStatus,
    SchedulingState, Severity, ShuttleError, StoreError, TaskDelta, ThreadStopAction,
};
use crate::impls::{
    HandlerRegistry, InMemorySecurityContext, InMemoryTaskStore, InMemoryTriggerEngine,
    ListenerEvent, RecordingListener, SYSTEM_IDENTITY, TriggerEvent,
};
use crate::ports::{FixedClock, Precondition, TaskHandler};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

struct Harness {
    store: InMemoryTaskStore,
    trigger: InMemoryTriggerEngine,
    listener: Arc<RecordingListener>,
    security: Arc<InMemorySecurityContext>,
    config: CoordinatorConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: InMemoryTaskStore::new(),
            trigger: InMemoryTriggerEngine::new(),
            listener: Arc::new(RecordingListener::new()),
            security: Arc::new(InMemorySecurityContext::new()),
            config: CoordinatorConfig::default(),
        }
    }

    fn coordinator(&self, handlers: Vec<(&str, Arc<dyn TaskHandler>)>) -> Arc<Coordinator> {
        self.coordinator_on(self.config.clone(), handlers)
    }

    fn coordinator_on(
        &self,
        config: CoordinatorConfig,
        handlers: Vec<(&str, Arc<dyn TaskHandler>)>,
    ) -> Arc<Coordinator> {
        self.coordinator_over(Arc::new(self.store.clone()), config, handlers)
    }

    fn coordinator_over(
        &self,
        store: Arc<dyn TaskStore>,
        config: CoordinatorConfig,
        handlers: Vec<(&str, Arc<dyn TaskHandler>)>,
    ) -> Arc<Coordinator> {
        let mut registry = HandlerRegistry::new();
        for (name, handler) in handlers {
            registry.register(HandlerRef::new(name), handler).unwrap();
        }
        let coordinator = Coordinator::builder(config)
            .store(store)
            .trigger(Arc::new(self.trigger.clone()))
            .handlers(Arc::new(registry))
            .listener(self.listener.clone())
            .security(self.security.clone())
            .clock(Arc::new(FixedClock::new(t0())))
            .build()
            .unwrap();
        Arc::new(coordinator)
    }

    async fn insert(&self, task: Task) -> TaskOid {
        let oid = task.oid;
        self.store.insert(task).await.unwrap();
        oid
    }

    async fn get(&self, oid: TaskOid) -> Task {
        self.store.get(oid).await.unwrap()
    }
}

fn task(handler: &str) -> Task {
    Task::new(TaskOid::from_ulid(Ulid::new()), "demo", HandlerRef::new(handler))
}

/// Returns a fixed outcome and counts its invocations.
struct Fixed {
    outcome: HandlerOutcome,
    calls: AtomicUsize,
}

impl Fixed {
    fn new(outcome: HandlerOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for Fixed {
    async fn run(&self, _ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

/// Blocks until released or until `can_run` turns false.
struct Gate {
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl TaskHandler for Gate {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        loop {
            if !ctx.can_run() {
                return Ok(HandlerOutcome::interrupted());
            }
            tokio::select! {
                _ = self.release.notified() => return Ok(HandlerOutcome::finished()),
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
    }
}

/// Never returns and never looks at `can_run`.
struct Stubborn {
    started: Notify,
}

#[async_trait]
impl TaskHandler for Stubborn {
    async fn run(&self, _ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

struct Failing;

#[async_trait]
impl TaskHandler for Failing {
    async fn run(&self, _ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        Err(HandlerError::failed("connector refused"))
    }
}

struct Panicking;

#[async_trait]
impl TaskHandler for Panicking {
    async fn run(&self, _ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        panic!("handler bug");
    }
}

struct Waiter;

#[async_trait]
impl TaskHandler for Waiter {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        ctx.switch_to_waiting()
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))?;
        Ok(HandlerOutcome::finished())
    }
}

/// Spawns two lightweight children and returns without waiting for them.
struct Partitioned;

#[async_trait]
impl TaskHandler for Partitioned {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        for name in ["partition-1", "partition-2"] {
            ctx.spawn_lightweight(name, |child| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let mut r = child.new_result();
                r.record_success();
                r
            });
        }
        Ok(HandlerOutcome::finished())
    }
}

/// Remembers the identity it ran as.
struct WhoAmI {
    security: Arc<InMemorySecurityContext>,
    seen: Mutex<Option<String>>,
}

#[async_trait]
impl TaskHandler for WhoAmI {
    async fn run(&self, _ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        *self.seen.lock().unwrap() = self.security.current();
        Ok(HandlerOutcome::finished())
    }
}

fn halted_at(report: &Result<FiringReport, FiringError>) -> Option<Severity> {
    match report {
        Ok(FiringReport::Halted { severity, .. }) => Some(*severity),
        _ => None,
    }
}

#[tokio::test]
async fn single_run_task_completes_and_closes() {
    let h = Harness::new();
    let handler = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h.insert(task("demo")).await;

    let report = c.execute(oid, false).await.unwrap();

    assert_eq!(
        report,
        FiringReport::Completed {
            oid,
            status: ResultStatus::Success
        }
    );
    assert_eq!(handler.calls(), 1);
    let t = h.get(oid).await;
    assert_eq!(t.scheduling_state, SchedulingState::Closed);
    assert_eq!(t.execution_state, ExecutionState::Closed);
    assert!(t.node.is_none());
    assert!(t.completed_at.is_some());
    assert!(c.running_tasks().is_empty());
}

#[rstest]
#[case::finished(HandlerOutcome::finished())]
#[case::temporary(HandlerOutcome::temporary_error("try later"))]
#[case::permanent(HandlerOutcome::permanent_error("bad config"))]
#[case::interrupted(HandlerOutcome::interrupted())]
#[tokio::test]
async fn node_is_cleared_after_every_outcome(#[case] outcome: HandlerOutcome) {
    let h = Harness::new();
    let c = h.coordinator(vec![("demo", Fixed::new(outcome))]);
    let oid = h.insert(task("demo").with_recurring(true)).await;

    c.execute(oid, false).await.unwrap();

    let t = h.get(oid).await;
    assert!(t.node.is_none());
    assert_ne!(t.execution_state, ExecutionState::Running);
}

#[rstest]
#[case(SchedulingState::Suspended)]
#[case(SchedulingState::Closed)]
#[case(SchedulingState::Waiting)]
#[tokio::test]
async fn non_ready_task_is_unscheduled_and_not_run(#[case] state: SchedulingState) {
    let h = Harness::new();
    let handler = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h.insert(task("demo").with_scheduling_state(state)).await;

    let report = c.execute(oid, false).await;

    assert_eq!(halted_at(&report), Some(Severity::Warning));
    assert_eq!(handler.calls(), 0);
    assert_eq!(h.trigger.events(), vec![TriggerEvent::Unscheduled(oid)]);
}

#[tokio::test]
async fn vanished_task_deletes_its_job() {
    let h = Harness::new();
    let c = h.coordinator(vec![]);
    let oid = TaskOid::from_ulid(Ulid::new());

    let report = c.execute(oid, false).await;

    assert_eq!(halted_at(&report), Some(Severity::Warning));
    assert_eq!(h.trigger.events(), vec![TriggerEvent::JobDeleted(oid)]);
}

#[tokio::test]
async fn store_failure_is_reported_and_job_kept() {
    let h = Harness::new();
    let c = h.coordinator(vec![]);
    let oid = h.insert(task("demo")).await;
    h.store.set_unavailable(true);

    let err = c.execute(oid, false).await.unwrap_err();

    assert!(matches!(
        err,
        FiringError::Stopped {
            severity: Severity::UnexpectedError,
            cause: ShuttleError::Store(_),
            ..
        }
    ));
    assert!(h.trigger.events().is_empty());
}

#[tokio::test]
async fn group_limit_defers_task_until_slot_frees() {
    let h = Harness::new();
    let gate = Gate::new();
    let quick = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("slow", gate.clone()), ("quick", quick.clone())]);
    let limited = ExecutionConstraints::group("import", Some(1));
    let a = h.insert(task("slow").with_constraints(limited.clone())).await;
    let b = h.insert(task("quick").with_constraints(limited)).await;

    let first = tokio::spawn({
        let c = c.clone();
        async move { c.execute(a, false).await }
    });
    gate.started.notified().await;

    let report = c.execute(b, false).await;
    assert_eq!(halted_at(&report), Some(Severity::Info));
    assert_eq!(quick.calls(), 0);
    assert_eq!(
        h.trigger.events_for(b),
        vec![TriggerEvent::RescheduledLater(b, t0() + TimeDelta::seconds(60))]
    );
    assert_eq!(h.get(b).await.execution_state, ExecutionState::Runnable);

    gate.release.notify_one();
    assert!(first.await.unwrap().unwrap().is_completed());

    assert!(c.execute(b, false).await.unwrap().is_completed());
    assert_eq!(quick.calls(), 1);
}

#[tokio::test]
async fn child_task_is_admitted_under_its_root_group() {
    let h = Harness::new();
    let gate = Gate::new();
    let quick = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("slow", gate.clone()), ("quick", quick.clone())]);
    let root = h
        .insert(
            task("quick")
                .with_scheduling_state(SchedulingState::Waiting)
                .with_constraints(ExecutionConstraints::group("import", Some(1))),
        )
        .await;
    let busy = h.insert(task("slow").with_parent(root)).await;
    let child = h.insert(task("quick").with_parent(root)).await;

    let first = tokio::spawn({
        let c = c.clone();
        async move { c.execute(busy, false).await }
    });
    gate.started.notified().await;

    assert_eq!(
        halted_at(&c.execute(child, false).await),
        Some(Severity::Info)
    );
    assert_eq!(quick.calls(), 0);

    gate.release.notify_one();
    first.await.unwrap().unwrap();
}

#[rstest]
#[case::close(ThreadStopAction::Close, SchedulingState::Closed, ExecutionState::Closed)]
#[case::suspend(ThreadStopAction::Suspend, SchedulingState::Suspended, ExecutionState::Suspended)]
#[tokio::test]
async fn recovering_task_gets_its_stop_action(
    #[case] action: ThreadStopAction,
    #[case] scheduling: SchedulingState,
    #[case] execution: ExecutionState,
) {
    let h = Harness::new();
    let handler = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h
        .insert(
            task("demo")
                .with_thread_stop_action(action)
                .with_execution_state(ExecutionState::Running)
                .with_node(NodeId::new("dead-node")),
        )
        .await;

    let report = c.execute(oid, true).await;

    assert_eq!(halted_at(&report), Some(Severity::Info));
    assert_eq!(handler.calls(), 0);
    let t = h.get(oid).await;
    assert_eq!(t.scheduling_state, scheduling);
    assert_eq!(t.execution_state, execution);
    assert!(t.node.is_none());
}

#[tokio::test]
async fn recovering_restartable_task_runs_again() {
    let h = Harness::new();
    let handler = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h
        .insert(
            task("demo")
                .with_recurring(true)
                .with_execution_state(ExecutionState::Running)
                .with_node(NodeId::new("dead-node")),
        )
        .await;

    let report = c.execute(oid, true).await.unwrap();

    assert!(report.is_completed());
    assert_eq!(handler.calls(), 1);
    assert_eq!(
        h.listener.events()[0],
        ListenerEvent::Started {
            oid,
            recovering: true
        }
    );
}

#[tokio::test]
async fn stale_local_state_is_repaired_before_running() {
    let h = Harness::new();
    let handler = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h
        .insert(
            task("demo")
                .with_execution_state(ExecutionState::Running)
                .with_node(h.config.node_id.clone()),
        )
        .await;

    assert!(c.execute(oid, false).await.unwrap().is_completed());
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn missing_handler_closes_task_with_explanation() {
    let h = Harness::new();
    let c = h.coordinator(vec![]);
    let oid = h.insert(task("ghost")).await;

    let err = c.execute(oid, false).await.unwrap_err();

    assert!(matches!(
        err,
        FiringError::Stopped {
            severity: Severity::UnexpectedError,
            cause: ShuttleError::HandlerNotFound(ref r),
            ..
        } if r == "ghost"
    ));
    let t = h.get(oid).await;
    assert_eq!(t.scheduling_state, SchedulingState::Closed);
    assert_eq!(t.execution_state, ExecutionState::Closed);
    assert!(t.node.is_none());
    let result = t.result.unwrap();
    assert!(result.is_fatal());
    assert!(result.message.unwrap().contains("ghost"));
}

#[tokio::test]
async fn concurrent_firings_of_one_task_run_it_once() {
    let h = Harness::new();
    let gate = Gate::new();
    let c = h.coordinator(vec![("demo", gate.clone())]);
    let oid = h.insert(task("demo").with_recurring(true)).await;

    let first = tokio::spawn({
        let c = c.clone();
        async move { c.execute(oid, false).await }
    });
    gate.started.notified().await;
    assert_eq!(c.running_tasks(), vec![oid]);

    let second = c.execute(oid, false).await.unwrap_err();
    assert!(matches!(
        second,
        FiringError::Stopped {
            severity: Severity::Error,
            cause: ShuttleError::ConcurrentExecution { .. },
            ..
        }
    ));

    gate.release.notify_one();
    assert!(first.await.unwrap().unwrap().is_completed());
    assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
    assert!(h.get(oid).await.node.is_none());
}

#[tokio::test]
async fn other_node_does_not_take_over_a_live_run() {
    let h = Harness::new();
    let gate = Gate::new();
    let node_a = h.coordinator_on(
        h.config.clone().with_node_id("node-a"),
        vec![("demo", gate.clone())],
    );
    let node_b = h.coordinator_on(
        h.config.clone().with_node_id("node-b"),
        vec![("demo", gate.clone())],
    );
    let oid = h.insert(task("demo").with_recurring(true)).await;

    let first = tokio::spawn({
        let c = node_a.clone();
        async move { c.execute(oid, false).await }
    });
    gate.started.notified().await;

    let err = node_b.execute(oid, false).await.unwrap_err();
    assert!(matches!(
        err,
        FiringError::Stopped {
            cause: ShuttleError::ConcurrentExecution { ref node, .. },
            ..
        } if node.as_str() == "node-a"
    ));
    assert_eq!(h.get(oid).await.node, Some(NodeId::new("node-a")));

    gate.release.notify_one();
    first.await.unwrap().unwrap();
}

/// Holds every group count until two firings have asked, so both pass
/// admission with the same snapshot.
struct LockstepStore {
    inner: InMemoryTaskStore,
    barrier: Barrier,
}

#[async_trait]
impl TaskStore for LockstepStore {
    async fn get(&self, oid: TaskOid) -> Result<Task, StoreError> {
        self.inner.get(oid).await
    }

    async fn modify(
        &self,
        oid: TaskOid,
        delta: TaskDelta,
        precondition: Precondition,
    ) -> Result<Task, StoreError> {
        self.inner.modify(oid, delta, precondition).await
    }

    async fn count_running_in_group(
        &self,
        group: &str,
        exclude: TaskOid,
    ) -> Result<usize, StoreError> {
        self.barrier.wait().await;
        self.inner.count_running_in_group(group, exclude).await
    }

    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        self.inner.insert(task).await
    }
}

#[tokio::test]
async fn interleaved_firings_on_two_nodes_run_once() {
    let h = Harness::new();
    let gate = Gate::new();
    let store: Arc<dyn TaskStore> = Arc::new(LockstepStore {
        inner: h.store.clone(),
        barrier: Barrier::new(2),
    });
    let node_a = h.coordinator_over(
        store.clone(),
        h.config.clone().with_node_id("node-a"),
        vec![("demo", gate.clone())],
    );
    let node_b = h.coordinator_over(
        store,
        h.config.clone().with_node_id("node-b"),
        vec![("demo", gate.clone())],
    );
    let oid = h
        .insert(
            task("demo")
                .with_recurring(true)
                .with_constraints(ExecutionConstraints::group("import", Some(5))),
        )
        .await;

    // the loser lets the winner finish
    let fire = |c: Arc<Coordinator>| {
        let gate = gate.clone();
        async move {
            let report = c.execute(oid, false).await;
            if report.is_err() {
                gate.release.notify_one();
            }
            report
        }
    };
    let (a, b) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(fire(node_a), fire(node_b)) },
    )
    .await
    .unwrap();

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        other => panic!("expected exactly one firing to run, got {other:?}"),
    };
    assert!(won.is_completed());
    assert!(matches!(
        lost,
        FiringError::Stopped {
            severity: Severity::Error,
            cause: ShuttleError::ConcurrentExecution { .. },
            ..
        }
    ));
    assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
    let t = h.get(oid).await;
    assert!(t.node.is_none());
    assert_eq!(t.execution_state, ExecutionState::Runnable);
}

#[rstest]
#[case::suspend(Some(ThreadStopAction::Suspend), SchedulingState::Suspended, false)]
#[case::close(Some(ThreadStopAction::Close), SchedulingState::Closed, false)]
#[case::restart(None, SchedulingState::Ready, true)]
#[tokio::test]
async fn interrupt_applies_stop_action(
    #[case] action: Option<ThreadStopAction>,
    #[case] expected: SchedulingState,
    #[case] scheduled_now: bool,
) {
    let h = Harness::new();
    let gate = Gate::new();
    let c = h.coordinator(vec![("demo", gate.clone())]);
    let mut t = task("demo");
    t.thread_stop_action = action;
    let oid = h.insert(t).await;

    let firing = tokio::spawn({
        let c = c.clone();
        async move { c.execute(oid, false).await }
    });
    gate.started.notified().await;
    assert!(c.interrupt(oid));

    let report = firing.await.unwrap().unwrap();

    assert_eq!(
        report,
        FiringReport::Completed {
            oid,
            status: ResultStatus::Interrupted
        }
    );
    let t = h.get(oid).await;
    assert_eq!(t.scheduling_state, expected);
    assert!(t.node.is_none());
    assert_eq!(
        h.trigger.events().contains(&TriggerEvent::ScheduledNow(oid)),
        scheduled_now
    );
}

#[tokio::test]
async fn interrupting_unknown_task_is_a_no_op() {
    let h = Harness::new();
    let c = h.coordinator(vec![]);
    assert!(!c.interrupt(TaskOid::from_ulid(Ulid::new())));
}

#[tokio::test]
async fn always_policy_stops_a_handler_that_ignores_can_run() {
    let mut h = Harness::new();
    h.config = h.config.clone().with_interrupt_policy(InterruptPolicy::Always);
    let handler = Arc::new(Stubborn {
        started: Notify::new(),
    });
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h.insert(task("demo").with_recurring(true)).await;

    let firing = tokio::spawn({
        let c = c.clone();
        async move { c.execute(oid, false).await }
    });
    handler.started.notified().await;
    c.interrupt(oid);

    let report = firing.await.unwrap().unwrap();
    assert_eq!(
        report,
        FiringReport::Completed {
            oid,
            status: ResultStatus::Interrupted
        }
    );
    assert!(h.get(oid).await.node.is_none());
}

#[tokio::test]
async fn deactivation_stops_running_and_later_firings() {
    let h = Harness::new();
    let gate = Gate::new();
    let c = h.coordinator(vec![("demo", gate.clone())]);
    let a = h.insert(task("demo").with_recurring(true)).await;
    let b = h.insert(task("demo").with_recurring(true)).await;

    let firing = tokio::spawn({
        let c = c.clone();
        async move { c.execute(a, false).await }
    });
    gate.started.notified().await;

    assert_eq!(c.deactivate(), 1);
    assert!(c.is_deactivated());
    let report = firing.await.unwrap().unwrap();
    assert!(matches!(
        report,
        FiringReport::Completed {
            status: ResultStatus::Interrupted,
            ..
        }
    ));

    // registered after deactivation: interrupted right away
    let report = c.execute(b, false).await.unwrap();
    assert!(matches!(
        report,
        FiringReport::Completed {
            status: ResultStatus::Interrupted,
            ..
        }
    ));
}

#[tokio::test]
async fn stopped_scheduler_applies_stop_action_without_running() {
    let h = Harness::new();
    let handler = Fixed::new(HandlerOutcome::finished());
    let c = h.coordinator(vec![("demo", handler.clone())]);
    let oid = h.insert(task("demo")).await;
    h.trigger.set_running(false);

    let report = c.execute(oid, false).await;

    assert_eq!(halted_at(&report), Some(Severity::Warning));
    assert_eq!(handler.calls(), 0);
    assert_eq!(h.trigger.events(), vec![TriggerEvent::ScheduledNow(oid)]);
}

#[tokio::test]
async fn handler_may_put_task_into_waiting() {
    let h = Harness::new();
    let c = h.coordinator(vec![("demo", Arc::new(Waiter))]);
    let oid = h.insert(task("demo")).await;

    assert!(c.execute(oid, false).await.unwrap().is_completed());

    let t = h.get(oid).await;
    assert_eq!(t.scheduling_state, SchedulingState::Waiting);
    assert_eq!(t.execution_state, ExecutionState::Waiting);
    assert!(t.node.is_none());
}

#[tokio::test]
async fn handler_error_is_recorded_and_surfaced() {
    let h = Harness::new();
    let c = h.coordinator(vec![("demo", Arc::new(Failing))]);
    let oid = h.insert(task("demo")).await;

    let err = c.execute(oid, false).await.unwrap_err();

    assert_eq!(
        err,
        FiringError::Handler {
            oid,
            source: HandlerError::failed("connector refused")
        }
    );
    let t = h.get(oid).await;
    assert!(t.result.as_ref().unwrap().is_fatal());
    assert!(t.is_ready());
    assert_eq!(t.execution_state, ExecutionState::Runnable);
    assert!(t.node.is_none());
}

#[tokio::test]
async fn panicking_handler_still_tears_everything_down() {
    let h = Harness::new();
    let c = h.coordinator(vec![("demo", Arc::new(Panicking))]);
    let oid = h.insert(task("demo")).await;

    let err = c.execute(oid, false).await.unwrap_err();

    assert!(matches!(
        err,
        FiringError::Handler {
            source: HandlerError::Panicked(ref m),
            ..
        } if m == "handler bug"
    ));
    assert!(h.security.current().is_none());
    assert!(c.running_tasks().is_empty());
    assert!(h.get(oid).await.node.is_none());
}

#[tokio::test]
async fn children_are_waited_for_and_their_results_kept() {
    let h = Harness::new();
    let c = h.coordinator(vec![("demo", Arc::new(Partitioned))]);
    let oid = h.insert(task("demo")).await;

    assert!(c.execute(oid, false).await.unwrap().is_completed());

    let result = h.get(oid).await.result.unwrap();
    let names: Vec<_> = result
        .subresults
        .iter()
        .map(|r| (r.operation.as_str(), r.status))
        .collect();
    assert_eq!(
        names,
        vec![
            ("partition-1", ResultStatus::Success),
            ("partition-2", ResultStatus::Success)
        ]
    );
}

#[tokio::test]
async fn listeners_and_security_context_bracket_the_run() {
    let h = Harness::new();
    let who = Arc::new(WhoAmI {
        security: h.security.clone(),
        seen: Mutex::new(None),
    });
    let c = h.coordinator(vec![("demo", who.clone())]);
    let owned = h.insert(task("demo").with_owner("administrator")).await;
    let unowned = h.insert(task("demo")).await;

    c.execute(owned, false).await.unwrap();
    assert_eq!(who.seen.lock().unwrap().as_deref(), Some("administrator"));
    c.execute(unowned, false).await.unwrap();
    assert_eq!(who.seen.lock().unwrap().as_deref(), Some(SYSTEM_IDENTITY));

    assert!(h.security.current().is_none());
    assert_eq!(
        h.listener.events(),
        vec![
            ListenerEvent::Started {
                oid: owned,
                recovering: false
            },
            ListenerEvent::Finished {
                oid: owned,
                status: ResultStatus::Success
            },
            ListenerEvent::Started {
                oid: unowned,
                recovering: false
            },
            ListenerEvent::Finished {
                oid: unowned,
                status: ResultStatus::Success
            },
        ]
    );
}

#[test]
fn builder_requires_every_port() {
    let err = Coordinator::builder(CoordinatorConfig::default())
        .store(Arc::new(InMemoryTaskStore::new()))
        .build()
        .err()
        .unwrap();
    assert_eq!(err, BuildError::Missing("trigger"));
}
