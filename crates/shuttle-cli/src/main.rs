use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shuttle_core::app::{Coordinator, CoordinatorConfig, RunContext};
use shuttle_core::domain::{
    ExecutionConstraints, ExecutionState, HandlerError, HandlerOutcome, HandlerRef, NodeId,
    ResultStatus, SchedulingState, Task, TaskOid, ThreadStopAction,
};
use shuttle_core::impls::{
    HandlerRegistry, InMemorySecurityContext, InMemoryTaskStore, InMemoryTriggerEngine,
    RecordingListener,
};
use shuttle_core::ports::{IdGenerator, SystemClock, TaskHandler, TaskStore, UlidGenerator};

const IMPORT_GROUP: &str = "import";

#[derive(Debug, Parser)]
#[command(name = "shuttle", version, about = "Shuttle task coordinator demo")]
struct Args {
    /// JSON file with the coordinator configuration. SHUTTLE_* variables are
    /// used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured node id.
    #[arg(short, long)]
    node_id: Option<String>,

    /// Number of import tasks fired at once.
    #[arg(short, long, default_value_t = 4)]
    tasks: usize,

    /// Concurrency limit of the import group.
    #[arg(short, long, default_value_t = 2)]
    group_limit: u32,
}

/// Splits its work into lightweight partitions and waits a little.
struct ImportHandler;

#[async_trait]
impl TaskHandler for ImportHandler {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        for partition in 1..=2 {
            ctx.spawn_lightweight(format!("partition-{partition}"), |child| async move {
                let mut result = child.new_result();
                for _ in 0..5 {
                    if !child.can_run() {
                        result.record(ResultStatus::Interrupted, None);
                        return result;
                    }
                    sleep(Duration::from_millis(20)).await;
                }
                result.record_success();
                result
            });
        }

        for _ in 0..10 {
            if !ctx.can_run() {
                return Ok(HandlerOutcome::interrupted());
            }
            sleep(Duration::from_millis(20)).await;
        }
        info!(task = %ctx.task(), "import done");
        Ok(HandlerOutcome::finished())
    }
}

/// Runs until it is told to stop.
struct LiveSyncHandler;

#[async_trait]
impl TaskHandler for LiveSyncHandler {
    async fn run(&self, ctx: &RunContext<'_>) -> Result<HandlerOutcome, HandlerError> {
        while ctx.can_run() {
            sleep(Duration::from_millis(10)).await;
        }
        warn!(task = %ctx.task(), "live sync stopped");
        Ok(HandlerOutcome::interrupted())
    }

    fn safe_without_interrupt(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct TaskSummary {
    oid: TaskOid,
    name: String,
    scheduling_state: SchedulingState,
    execution_state: ExecutionState,
    node: Option<NodeId>,
    result: Option<ResultStatus>,
    subresults: usize,
}

impl From<Task> for TaskSummary {
    fn from(task: Task) -> Self {
        Self {
            oid: task.oid,
            name: task.name,
            scheduling_state: task.scheduling_state,
            execution_state: task.execution_state,
            node: task.node,
            result: task.result.as_ref().map(|r| r.status),
            subresults: task.result.map(|r| r.subresults.len()).unwrap_or(0),
        }
    }
}

fn load_config(args: &Args) -> Result<CoordinatorConfig, Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => CoordinatorConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => CoordinatorConfig::from_env()?,
    };
    Ok(match &args.node_id {
        Some(node) => config.with_node_id(node.clone()),
        None => config,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(node = %config.node_id, policy = %config.interrupt_policy, "starting demo");

    let store = InMemoryTaskStore::new();
    let trigger = InMemoryTriggerEngine::new();
    let ids = UlidGenerator::new(SystemClock);

    let mut registry = HandlerRegistry::new();
    registry.register(HandlerRef::new("demo.import"), Arc::new(ImportHandler))?;
    registry.register(HandlerRef::new("demo.live-sync"), Arc::new(LiveSyncHandler))?;

    let coordinator = Arc::new(
        Coordinator::builder(config)
            .store(Arc::new(store.clone()))
            .trigger(Arc::new(trigger.clone()))
            .handlers(Arc::new(registry))
            .listener(Arc::new(RecordingListener::new()))
            .security(Arc::new(InMemorySecurityContext::new()))
            .build()?,
    );

    tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let stopped = coordinator.deactivate();
                warn!(stopped, "Ctrl-C received, deactivating node");
            }
        }
    });

    // (A) group-limited imports, fired all at once
    let constraints = ExecutionConstraints::group(IMPORT_GROUP, Some(args.group_limit));
    let mut imports = Vec::new();
    for i in 0..args.tasks {
        let task = Task::new(
            ids.generate_task_oid(),
            format!("import-{i}"),
            HandlerRef::new("demo.import"),
        )
        .with_constraints(constraints.clone())
        .with_owner("administrator");
        imports.push(task.oid);
        store.insert(task).await?;
    }

    let mut firings = JoinSet::new();
    for oid in imports.iter().copied() {
        let coordinator = Arc::clone(&coordinator);
        firings.spawn(async move { (oid, coordinator.execute(oid, false).await) });
    }
    while let Some(joined) = firings.join_next().await {
        let (oid, report) = joined?;
        match report {
            Ok(report) => info!(%oid, ?report, "firing finished"),
            Err(e) => warn!(%oid, error = %e, "firing failed"),
        }
    }
    info!(deferred = trigger.events().len(), "group-limited firings done");

    // (B) a task whose previous node crashed mid-run
    let crashed = Task::new(
        ids.generate_task_oid(),
        "crashed-import",
        HandlerRef::new("demo.import"),
    )
    .with_execution_state(ExecutionState::Running)
    .with_node(NodeId::new("crashed-node"))
    .with_thread_stop_action(ThreadStopAction::Close);
    let crashed_oid = crashed.oid;
    store.insert(crashed).await?;
    let report = coordinator.execute(crashed_oid, true).await?;
    info!(oid = %crashed_oid, ?report, "recovering firing finished");

    // (C) interrupting a long-running task
    let live = Task::new(
        ids.generate_task_oid(),
        "live-sync",
        HandlerRef::new("demo.live-sync"),
    )
    .with_recurring(true)
    .with_thread_stop_action(ThreadStopAction::Suspend);
    let live_oid = live.oid;
    store.insert(live).await?;

    let running = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.execute(live_oid, false).await }
    });
    sleep(Duration::from_millis(50)).await;
    info!(running = ?coordinator.running_tasks(), "interrupting live sync");
    coordinator.interrupt(live_oid);
    let report = running.await??;
    info!(oid = %live_oid, ?report, "interrupted firing finished");

    let mut summaries: Vec<TaskSummary> = store.all().await.into_iter().map(Into::into).collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    Ok(())
}
