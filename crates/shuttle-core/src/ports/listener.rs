//! TaskListener port - notifications about task threads.

use crate::domain::{OperationResult, Task};

/// Observer of firings on this node. Called inline; keep it cheap.
pub trait TaskListener: Send + Sync {
    fn on_thread_start(&self, task: &Task, recovering: bool);

    fn on_thread_finish(&self, task: &Task, result: &OperationResult);
}
