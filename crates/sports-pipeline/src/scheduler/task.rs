//! Task records.
//!
//! A task is plain data: a name, an ordered list of dependencies, a target
//! and a run behavior. The scheduler only ever calls
//! [`Target::exists`](super::Target::exists) and [`TaskAction::run`].

use super::target::Target;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Index of a task inside its [`TaskGraph`](super::TaskGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Lifecycle of a task within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
}

/// Run behavior of a task.
///
/// Implemented for every `Fn() -> Result<()>` closure, so most tasks are
/// registered with a closure capturing their inputs.
pub trait TaskAction: Send + Sync {
    fn run(&self) -> Result<()>;
}

impl<F> TaskAction for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn run(&self) -> Result<()> {
        self()
    }
}

/// A registered task.
pub struct Task {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) target: Arc<dyn Target>,
    pub(crate) action: Box<dyn TaskAction>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
