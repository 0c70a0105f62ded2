//! Sports Data Pipeline Library
//!
//! A batch pipeline that downloads a tabular sports dataset from object
//! storage, profiles it, cleans it statistically, loads it into SQLite and
//! runs a fixed aggregate query.
//!
//! # Overview
//!
//! - **Task scheduling**: a dependency graph of tasks, each bound to a
//!   persisted target; complete targets are skipped, so an interrupted build
//!   resumes where it stopped
//! - **Tolerant parsing**: malformed rows are dropped one by one against a
//!   declared schema
//! - **Cleaning**: mean/mode imputation, then a z-score pass and an IQR pass
//! - **Exploration**: null counts, descriptive statistics and distribution
//!   artifacts
//! - **Storage**: full-replace load into SQLite and one aggregate query
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sports_pipeline::{PipelineConfig, SportsPipeline};
//!
//! let config = PipelineConfig::builder()
//!     .work_dir("./output")
//!     .database_path("sports.db")
//!     .build()?;
//!
//! let pipeline = SportsPipeline::new(config)?;
//! let report = pipeline.run(&pipeline.default_roots())?;
//! println!("executed: {:?}", report.executed());
//! ```
//!
//! # Cleaning a table directly
//!
//! ```rust,ignore
//! use sports_pipeline::{CleaningEngine, TableSchema, TolerantReader};
//!
//! let (raw, stats) = TolerantReader::new(TableSchema::sports()).read_path("data.csv".as_ref())?;
//! let (cleaned, report) = CleaningEngine::default().clean(&raw)?;
//! println!("{} -> {} rows", report.rows_in, report.rows_out());
//! ```

pub mod cleaning;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod table;
pub mod tasks;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use cleaning::{CleaningEngine, CleaningReport, CleaningStages};
pub use config::{CleaningConfig, ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, Result, ResultExt};
pub use scheduler::{
    BuildReport, ClosureProgressReporter, FileTarget, ProgressReporter, ProgressUpdate, Scheduler,
    Target, TaskGraph, TaskId, TaskOutcome, TaskPhase, TaskStatus, TracingProgressReporter,
};
pub use table::{ReadStats, Table, TolerantReader};
pub use tasks::SportsPipeline;
pub use types::{ColumnSpec, SemanticType, TableSchema};
