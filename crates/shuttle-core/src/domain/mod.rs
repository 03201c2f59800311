//! Domain model (IDs, task record, states, results, stop values).

pub mod errors;
pub mod ids;
pub mod policy;
pub mod result;
pub mod state;
pub mod stop;
pub mod task;

pub use errors::{
    HandlerError, PolicyError, RegistryError, SchedulerError, ShuttleError, StoreError,
};
pub use ids::{ChildId, Id, IdMarker, NodeId, TaskOid};
pub use policy::{StopContext, StopDirective, resolve_thread_stop};
pub use result::{HandlerOutcome, OperationResult, ResultStatus, RunStatus};
pub use state::{Binding, ExecutionState, SchedulingState, ThreadStopAction};
pub use stop::{FiringError, FiringReport, FiringStep, Severity, StopFiring};
pub use task::{
    ExecutionConstraints, GroupConstraint, HandlerRef, MAX_HIERARCHY_DEPTH, Task, TaskDelta,
};
