//! Progress reporting for builds.
//!
//! The scheduler emits one [`ProgressUpdate`] whenever a task is started,
//! skipped, completed or failed. Long-running task bodies (the download) may
//! emit intermediate [`TaskPhase::Progress`] updates carrying byte counts.
//!
//! # Example
//!
//! ```rust,ignore
//! use sports_pipeline::scheduler::{ClosureProgressReporter, Scheduler};
//! use std::sync::Arc;
//!
//! let reporter = Arc::new(ClosureProgressReporter::new(|update| {
//!     println!("[{}] {:?} {}", update.task, update.phase, update.message);
//! }));
//! let report = Scheduler::new(&graph).with_reporter(reporter).build(&[query])?;
//! ```

use serde::{Deserialize, Serialize};
use tracing::{Level, debug, info, warn};

/// Phase of a task reported in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// The task's run behavior was invoked.
    Started,
    /// The task's target was already complete.
    Skipped,
    /// Intermediate progress from inside a running task.
    Progress,
    /// The run finished and the target is complete.
    Completed,
    /// The run failed or did not produce its target.
    Failed,
}

impl TaskPhase {
    /// Returns a human-readable name for the phase.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Skipped => "Skipped (already complete)",
            Self::Progress => "In progress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Name of the task the update is about.
    pub task: String,

    pub phase: TaskPhase,

    /// Human-readable message describing current activity.
    pub message: String,

    /// Bytes processed so far (for streaming tasks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_done: Option<u64>,

    /// Total bytes expected, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
}

impl ProgressUpdate {
    pub fn new(task: impl Into<String>, phase: TaskPhase, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            phase,
            message: message.into(),
            bytes_done: None,
            bytes_total: None,
        }
    }

    /// Creates a byte-count update for a streaming task.
    pub fn bytes(task: impl Into<String>, done: u64, total: Option<u64>) -> Self {
        let message = match total {
            Some(total) if total > 0 => {
                format!("{} / {} bytes ({:.0}%)", done, total, done as f64 / total as f64 * 100.0)
            }
            _ => format!("{} bytes", done),
        };
        Self {
            task: task.into(),
            phase: TaskPhase::Progress,
            message,
            bytes_done: Some(done),
            bytes_total: total,
        }
    }

    /// Fraction complete, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match (self.bytes_done, self.bytes_total) {
            (Some(done), Some(total)) if total > 0 => Some((done as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Trait for receiving progress updates during a build.
///
/// Implementations must be `Send + Sync` so a reporter can be shared
/// between the scheduler and the task bodies it runs.
pub trait ProgressReporter: Send + Sync {
    /// Called for every update. Should return quickly.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Reporter that writes every update to the `tracing` log.
///
/// Lifecycle events and download byte progress are logged at `INFO`,
/// failures at `WARN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressReporter;

impl TracingProgressReporter {
    /// Log level used for updates in `phase`.
    pub fn level_for(phase: TaskPhase) -> Level {
        match phase {
            TaskPhase::Failed => Level::WARN,
            TaskPhase::Started | TaskPhase::Skipped | TaskPhase::Progress | TaskPhase::Completed => {
                Level::INFO
            }
        }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report(&self, update: ProgressUpdate) {
        let line = match update.phase {
            TaskPhase::Progress | TaskPhase::Failed => format!("{}: {}", update.task, update.message),
            phase => format!("{} - {}", update.task, phase.display_name()),
        };
        let level = Self::level_for(update.phase);
        if level <= Level::WARN {
            warn!("{}", line);
        } else if level == Level::INFO {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
static_assertions::assert_impl_all!(TracingProgressReporter: ProgressReporter);
