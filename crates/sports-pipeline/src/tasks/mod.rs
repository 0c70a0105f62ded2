//! The five pipeline tasks and the graph wiring them together.
//!
//! ```text
//! download_data ──► explore_data
//!       │
//!       └──► clean_data ──► load_data ──► query_data
//! ```

pub mod clean;
pub mod download;
pub mod explore;
pub mod store;

pub use clean::{CleanSummary, CleanTask};
pub use download::{DownloadTask, copy_with_progress};
pub use explore::{DatasetProfile, Distribution, ExploreTask};
pub use store::{LoadTask, QueryTask, SqlStore, render_tuple_row};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::scheduler::{
    BuildReport, FileTarget, ProgressReporter, Scheduler, TaskGraph, TaskId, TaskStatus,
};
use std::sync::Arc;
use tracing::info;

pub const DOWNLOAD_TASK: &str = "download_data";
pub const EXPLORE_TASK: &str = "explore_data";
pub const CLEAN_TASK: &str = "clean_data";
pub const LOAD_TASK: &str = "load_data";
pub const QUERY_TASK: &str = "query_data";

/// The sports pipeline: configuration plus its task graph.
pub struct SportsPipeline {
    config: PipelineConfig,
    graph: TaskGraph,
    query: TaskId,
    explore: TaskId,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl SportsPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::assemble(config, None)
    }

    /// Build the pipeline with a reporter that receives task and download
    /// progress.
    pub fn with_reporter(config: PipelineConfig, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        Self::assemble(config, Some(reporter))
    }

    fn assemble(config: PipelineConfig, reporter: Option<Arc<dyn ProgressReporter>>) -> Result<Self> {
        config.validate()?;

        let names = &config.artifacts;
        let raw_path = config.artifact_path(&names.raw_data);
        let cleaned_path = config.artifact_path(&names.cleaned_data);
        let raw = FileTarget::new(&raw_path);
        let report = FileTarget::new(config.artifact_path(&names.exploration_report));
        let cleaned = FileTarget::new(&cleaned_path);
        let loaded = FileTarget::new(config.artifact_path(&names.load_marker));
        let results = FileTarget::new(config.artifact_path(&names.query_results));
        let store = SqlStore::new(config.database_path(), config.database.table.clone());

        let mut graph = TaskGraph::new();
        let download = graph.add_task(
            DOWNLOAD_TASK,
            &[],
            Arc::new(raw.clone()),
            DownloadTask::new(DOWNLOAD_TASK, config.storage.clone(), raw, reporter.clone())?,
        )?;
        let explore = graph.add_task(
            EXPLORE_TASK,
            &[download],
            Arc::new(report.clone()),
            ExploreTask::new(config.schema.clone(), &raw_path, &config.work_dir, report),
        )?;
        let clean = graph.add_task(
            CLEAN_TASK,
            &[download],
            Arc::new(cleaned.clone()),
            CleanTask::new(config.schema.clone(), config.cleaning.clone(), &raw_path, cleaned),
        )?;
        let load = graph.add_task(
            LOAD_TASK,
            &[clean],
            Arc::new(loaded.clone()),
            LoadTask::new(config.schema.clone(), store.clone(), &cleaned_path, loaded),
        )?;
        let query = graph.add_task(
            QUERY_TASK,
            &[load],
            Arc::new(results.clone()),
            QueryTask::new(store, results),
        )?;

        Ok(Self {
            config,
            graph,
            query,
            explore,
            reporter,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// The query results plus the exploration report, which the query does
    /// not depend on.
    pub fn default_roots(&self) -> Vec<TaskId> {
        vec![self.query, self.explore]
    }

    /// Look up tasks by name.
    pub fn resolve_tasks<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<TaskId>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.graph.task_id(name).ok_or_else(|| {
                    let known: Vec<&str> = self.graph.tasks().map(|(_, t)| t.name()).collect();
                    PipelineError::InvalidGraph(format!(
                        "unknown task '{}' (known: {})",
                        name,
                        known.join(", ")
                    ))
                })
            })
            .collect()
    }

    /// Build `roots`, or the default roots when empty.
    pub fn run(&self, roots: &[TaskId]) -> Result<BuildReport> {
        let roots = if roots.is_empty() {
            self.default_roots()
        } else {
            roots.to_vec()
        };
        info!("Building {} root task(s) in {}", roots.len(), self.config.work_dir.display());

        let mut scheduler = Scheduler::new(&self.graph);
        if let Some(reporter) = &self.reporter {
            scheduler = scheduler.with_reporter(reporter.clone());
        }
        scheduler.build(&roots)
    }

    pub fn status(&self) -> Result<Vec<TaskStatus>> {
        self.graph.status()
    }
}
