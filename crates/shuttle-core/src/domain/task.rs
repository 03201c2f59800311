//! The persisted task record and partial updates to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{NodeId, TaskOid};
use super::result::OperationResult;
use super::state::{Binding, ExecutionState, SchedulingState, ThreadStopAction};

/// Maximum parent hops followed when resolving a hierarchy root. A cycle or a
/// deeper chain ends the walk at the last ancestor reached.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Opaque identifier used to resolve handler logic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerRef(String);

impl HandlerRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Membership in a named concurrency group.
///
/// `limit = None` means the group is only used for grouping; a cluster-wide
/// override from configuration may still impose a ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConstraint {
    pub group: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl GroupConstraint {
    pub fn new(group: impl Into<String>, limit: Option<u32>) -> Self {
        Self {
            group: group.into(),
            limit,
        }
    }
}

/// Concurrency groups of a task. The first entry is the primary group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConstraints {
    pub groups: Vec<GroupConstraint>,
    /// Delay before retrying when admission is refused.
    #[serde(default)]
    pub retry_after_secs: Option<u64>,
}

impl ExecutionConstraints {
    pub fn group(group: impl Into<String>, limit: Option<u32>) -> Self {
        Self {
            groups: vec![GroupConstraint::new(group, limit)],
            retry_after_secs: None,
        }
    }

    pub fn with_secondary(mut self, group: impl Into<String>, limit: Option<u32>) -> Self {
        self.groups.push(GroupConstraint::new(group, limit));
        self
    }

    pub fn with_retry_after_secs(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.group == group)
    }
}

/// The persisted unit of work.
///
/// `version` is maintained by the store and bumped on every successful modify.
///
/// # Example
/// ```
/// use shuttle_core::domain::{HandlerRef, SchedulingState, Task, TaskOid, ThreadStopAction};
/// use ulid::Ulid;
///
/// let task = Task::new(TaskOid::from_ulid(Ulid::new()), "nightly import", HandlerRef::new("import"))
///     .with_thread_stop_action(ThreadStopAction::Suspend)
///     .with_recurring(true);
///
/// assert_eq!(task.scheduling_state, SchedulingState::Ready);
/// assert!(task.node.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub oid: TaskOid,
    pub name: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub parent: Option<TaskOid>,
    /// Identity the handler runs as.
    #[serde(default)]
    pub owner: Option<String>,
    pub handler_ref: HandlerRef,
    pub scheduling_state: SchedulingState,
    pub execution_state: ExecutionState,
    #[serde(default)]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub thread_stop_action: Option<ThreadStopAction>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub binding: Binding,
    #[serde(default)]
    pub execution_constraints: Option<ExecutionConstraints>,
    #[serde(default)]
    pub result: Option<OperationResult>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(oid: TaskOid, name: impl Into<String>, handler_ref: HandlerRef) -> Self {
        Self {
            oid,
            name: name.into(),
            version: 0,
            parent: None,
            owner: None,
            handler_ref,
            scheduling_state: SchedulingState::Ready,
            execution_state: ExecutionState::Runnable,
            node: None,
            thread_stop_action: None,
            recurring: false,
            binding: Binding::default(),
            execution_constraints: None,
            result: None,
            completed_at: None,
        }
    }

    pub fn with_parent(mut self, parent: TaskOid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_scheduling_state(mut self, state: SchedulingState) -> Self {
        self.scheduling_state = state;
        self
    }

    pub fn with_execution_state(mut self, state: ExecutionState) -> Self {
        self.execution_state = state;
        self
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_thread_stop_action(mut self, action: ThreadStopAction) -> Self {
        self.thread_stop_action = Some(action);
        self
    }

    pub fn with_recurring(mut self, recurring: bool) -> Self {
        self.recurring = recurring;
        self
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_constraints(mut self, constraints: ExecutionConstraints) -> Self {
        self.execution_constraints = Some(constraints);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.scheduling_state == SchedulingState::Ready
    }

    /// Recurring and loosely bound: the trigger engine re-fires it on its own.
    pub fn is_loosely_recurring(&self) -> bool {
        self.recurring && self.binding == Binding::Loose
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.oid)
    }
}

/// Partial update to a task. Unset fields are left alone.
///
/// `node` and `completed_at` are doubly optional: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDelta {
    pub scheduling_state: Option<SchedulingState>,
    pub execution_state: Option<ExecutionState>,
    pub node: Option<Option<NodeId>>,
    pub result: Option<OperationResult>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduling(mut self, state: SchedulingState) -> Self {
        self.scheduling_state = Some(state);
        self
    }

    pub fn execution(mut self, state: ExecutionState) -> Self {
        self.execution_state = Some(state);
        self
    }

    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(Some(node));
        self
    }

    pub fn clear_node(mut self) -> Self {
        self.node = Some(None);
        self
    }

    pub fn result(mut self, result: OperationResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(Some(at));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(state) = self.scheduling_state {
            task.scheduling_state = state;
        }
        if let Some(state) = self.execution_state {
            task.execution_state = state;
        }
        if let Some(node) = &self.node {
            task.node = node.clone();
        }
        if let Some(result) = &self.result {
            task.result = Some(result.clone());
        }
        if let Some(at) = self.completed_at {
            task.completed_at = at;
        }
    }
}
