//! Task-dependency scheduler.
//!
//! Tasks are registered into a [`TaskGraph`] and materialized by a
//! [`Scheduler`]. A build walks each requested root depth-first, resolving
//! dependencies in declared order, and runs a task only when its target is
//! incomplete, when something upstream of it was re-run in the same build,
//! or when a dependency's target is newer than its own (an earlier build
//! regenerated the input and then aborted).
//!
//! ```rust,ignore
//! let mut graph = TaskGraph::new();
//! let raw = graph.add_task("download_data", &[], raw_target, download)?;
//! let clean = graph.add_task("clean_data", &[raw], clean_target, clean)?;
//! let report = Scheduler::new(&graph).build(&[clean])?;
//! ```

mod progress;
mod target;
mod task;

pub use progress::{
    ClosureProgressReporter, ProgressReporter, ProgressUpdate, TaskPhase, TracingProgressReporter,
};
pub use target::{AtomicFileWriter, FileTarget, Target, TargetWriter};
pub use task::{Task, TaskAction, TaskId, TaskState};

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// An append-only set of tasks.
///
/// A dependency must already be registered when its dependent is added, so
/// the graph cannot contain a cycle.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    by_name: HashMap<String, TaskId>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return its id.
    ///
    /// Fails with [`PipelineError::InvalidGraph`] on a duplicate name or a
    /// dependency id that does not belong to this graph.
    pub fn add_task<A>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[TaskId],
        target: Arc<dyn Target>,
        action: A,
    ) -> Result<TaskId>
    where
        A: TaskAction + 'static,
    {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(PipelineError::InvalidGraph(format!(
                "task '{}' is already registered",
                name
            )));
        }
        if let Some(unknown) = dependencies.iter().find(|d| d.0 >= self.tasks.len()) {
            return Err(PipelineError::InvalidGraph(format!(
                "task '{}' depends on unregistered task #{}",
                name, unknown.0
            )));
        }

        let id = TaskId(self.tasks.len());
        debug!("Registered task '{}' ({} dependencies)", name, dependencies.len());
        self.by_name.insert(name.clone(), id);
        self.tasks.push(Task {
            name,
            dependencies: dependencies.to_vec(),
            target,
            action: Box::new(action),
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.by_name.get(name).copied()
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks.iter().enumerate().map(|(i, t)| (TaskId(i), t))
    }

    /// Current completeness of every target, without running anything.
    pub fn status(&self) -> Result<Vec<TaskStatus>> {
        self.tasks
            .iter()
            .map(|task| {
                Ok(TaskStatus {
                    task: task.name.clone(),
                    target: task.target.reference(),
                    complete: task.target.exists()?,
                })
            })
            .collect()
    }

    fn get(&self, id: TaskId) -> Result<&Task> {
        self.tasks
            .get(id.0)
            .ok_or_else(|| PipelineError::InvalidGraph(format!("unknown task #{}", id.0)))
    }
}

/// A task's target as seen by [`TaskGraph::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task: String,
    pub target: String,
    pub complete: bool,
}

/// What the scheduler did with a visited task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Executed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEntry {
    pub task: String,
    pub outcome: TaskOutcome,
    pub state: TaskState,
}

/// Tasks visited by a successful build, in the order they were resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub entries: Vec<BuildEntry>,
    pub duration_ms: u64,
}

impl BuildReport {
    /// Names of tasks whose run behavior was invoked.
    pub fn executed(&self) -> Vec<&str> {
        self.with_outcome(TaskOutcome::Executed)
    }

    /// Names of tasks whose target was already complete.
    pub fn skipped(&self) -> Vec<&str> {
        self.with_outcome(TaskOutcome::Skipped)
    }

    fn with_outcome(&self, outcome: TaskOutcome) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.outcome == outcome)
            .map(|e| e.task.as_str())
            .collect()
    }
}

/// Per-build bookkeeping for one task.
#[derive(Debug, Clone, Copy)]
struct Visit {
    state: TaskState,
    executed: bool,
}

/// Sequential, depth-first executor over a [`TaskGraph`].
pub struct Scheduler<'g> {
    graph: &'g TaskGraph,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl<'g> Scheduler<'g> {
    pub fn new(graph: &'g TaskGraph) -> Self {
        Self {
            graph,
            reporter: None,
        }
    }

    /// Send task events to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Make every root's target complete.
    ///
    /// Each task is run at most once per call. The first failure aborts the
    /// build and is returned as [`PipelineError::TaskFailed`]; tasks not yet
    /// reached are left untouched.
    pub fn build(&self, roots: &[TaskId]) -> Result<BuildReport> {
        let start = Instant::now();
        let mut visits: Vec<Option<Visit>> = vec![None; self.graph.len()];
        let mut entries = Vec::new();

        for &root in roots {
            self.resolve(root, &mut visits, &mut entries)?;
        }

        let report = BuildReport {
            entries,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Build finished in {} ms: {} executed, {} skipped",
            report.duration_ms,
            report.executed().len(),
            report.skipped().len()
        );
        Ok(report)
    }

    /// Resolve one task, returning whether it was executed in this build.
    fn resolve(
        &self,
        id: TaskId,
        visits: &mut [Option<Visit>],
        entries: &mut Vec<BuildEntry>,
    ) -> Result<bool> {
        let task = self.graph.get(id)?;
        if let Some(visit) = visits[id.0] {
            if visit.state == TaskState::Pending {
                return Err(PipelineError::InvalidGraph(format!(
                    "task '{}' depends on itself",
                    task.name
                )));
            }
            return Ok(visit.executed);
        }
        visits[id.0] = Some(Visit {
            state: TaskState::Pending,
            executed: false,
        });

        let mut upstream_ran = false;
        for &dep in &task.dependencies {
            upstream_ran |= self.resolve(dep, visits, entries)?;
        }

        let complete = task
            .target
            .exists()
            .map_err(|e| self.fail(task, e, visits, id, entries))?;

        let newer_input = if complete && !upstream_ran {
            self.newer_dependency(task)
                .map_err(|e| self.fail(task, e, visits, id, entries))?
        } else {
            None
        };

        if complete && !upstream_ran && newer_input.is_none() {
            debug!("Task '{}' is complete, skipping", task.name);
            visits[id.0] = Some(Visit {
                state: TaskState::Done,
                executed: false,
            });
            entries.push(BuildEntry {
                task: task.name.clone(),
                outcome: TaskOutcome::Skipped,
                state: TaskState::Done,
            });
            self.emit(task, TaskPhase::Skipped, task.target.reference());
            return Ok(false);
        }

        if let Some(dependency) = newer_input {
            info!(
                "Task '{}' is older than its input '{}', re-running",
                task.name, dependency
            );
        } else if complete {
            info!("Task '{}' is stale, re-running", task.name);
        } else {
            info!("Running task '{}'", task.name);
        }
        visits[id.0] = Some(Visit {
            state: TaskState::Running,
            executed: true,
        });
        self.emit(task, TaskPhase::Started, format!("Running {}", task.name));

        task.action
            .run()
            .map_err(|e| self.fail(task, e, visits, id, entries))?;

        let produced = task
            .target
            .exists()
            .map_err(|e| self.fail(task, e, visits, id, entries))?;
        if !produced {
            let missing = PipelineError::TargetNotProduced {
                task: task.name.clone(),
                target: task.target.reference(),
            };
            return Err(self.fail(task, missing, visits, id, entries));
        }

        visits[id.0] = Some(Visit {
            state: TaskState::Done,
            executed: true,
        });
        entries.push(BuildEntry {
            task: task.name.clone(),
            outcome: TaskOutcome::Executed,
            state: TaskState::Done,
        });
        self.emit(task, TaskPhase::Completed, task.target.reference());
        Ok(true)
    }

    /// First dependency whose target was written after `task`'s target.
    ///
    /// Covers inputs regenerated by an earlier build that aborted before
    /// reaching `task`.
    fn newer_dependency(&self, task: &Task) -> Result<Option<&'g str>> {
        let Some(own) = task.target.modified()? else {
            return Ok(None);
        };
        for &dep in &task.dependencies {
            let dependency = self.graph.get(dep)?;
            if let Some(written) = dependency.target.modified()?
                && written > own
            {
                return Ok(Some(dependency.name.as_str()));
            }
        }
        Ok(None)
    }

    fn fail(
        &self,
        task: &Task,
        source: PipelineError,
        visits: &mut [Option<Visit>],
        id: TaskId,
        entries: &mut Vec<BuildEntry>,
    ) -> PipelineError {
        error!("Task '{}' failed: {}", task.name, source);
        let executed = visits[id.0].is_some_and(|v| v.executed);
        visits[id.0] = Some(Visit {
            state: TaskState::Failed,
            executed,
        });
        entries.push(BuildEntry {
            task: task.name.clone(),
            outcome: if executed {
                TaskOutcome::Executed
            } else {
                TaskOutcome::Skipped
            },
            state: TaskState::Failed,
        });
        self.emit(task, TaskPhase::Failed, source.to_string());
        PipelineError::TaskFailed {
            task: task.name.clone(),
            source: Box::new(source),
        }
    }

    fn emit(&self, task: &Task, phase: TaskPhase, message: impl Into<String>) {
        if let Some(reporter) = &self.reporter {
            reporter.report(ProgressUpdate::new(task.name.clone(), phase, message));
        }
    }
}
