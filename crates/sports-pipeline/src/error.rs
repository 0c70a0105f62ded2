//! Custom error types for the sports data pipeline.
//!
//! Every failure that can stop a build is a variant of [`PipelineError`].
//! Row-level parse defects are the only failures absorbed locally (the row is
//! dropped by the tolerant reader); everything else propagates to the
//! scheduler, which wraps it in [`PipelineError::TaskFailed`] and aborts.
//!
//! Errors are serializable so a build report can carry them as
//! `{ "code": ..., "message": ... }`.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Object storage was unreachable or answered with an error status.
    #[error("Transport failure fetching '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// A declared column was not found in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// A column exists but does not have the declared semantic type.
    #[error("Column '{column}' has type {actual}, expected {expected}")]
    ColumnTypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// No non-missing values were available for a statistic.
    #[error("No valid values found in column '{0}'")]
    NoValidValues(String),

    /// A non-numeric or non-finite value reached a numeric computation.
    #[error("Non-numeric value in column '{column}' at row {row}: {value}")]
    NonNumericValue {
        column: String,
        row: usize,
        value: String,
    },

    /// The raw input had no usable header row.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Writing to or reading from the relational store failed.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Drawing a chart failed.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A task name was registered twice or a dependency was unknown.
    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),

    /// A task's run returned successfully but its target is still incomplete.
    #[error("Task '{task}' finished without producing its target '{target}'")]
    TargetNotProduced { task: String, target: String },

    /// A task failed; the build was aborted at this task.
    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error wrapper.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP request error.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code.
    ///
    /// Wrapping variants (`WithContext`, `TaskFailed`) report the code of the
    /// error they wrap, so callers can match on the originating cause.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT_FAILURE",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::ColumnTypeMismatch { .. } => "COLUMN_TYPE_MISMATCH",
            Self::NoValidValues(_) => "NO_VALID_VALUES",
            Self::NonNumericValue { .. } => "NON_NUMERIC_VALUE",
            Self::MalformedInput(_) => "MALFORMED_INPUT",
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
            Self::Render(_) => "RENDER_FAILURE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidGraph(_) => "INVALID_GRAPH",
            Self::TargetNotProduced { .. } => "TARGET_NOT_PRODUCED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Sqlite(_) => "PERSISTENCE_FAILURE",
            Self::HttpRequest(_) => "TRANSPORT_FAILURE",
            Self::TaskFailed { source, .. } => source.error_code(),
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Name of the task that failed, if this error came out of a build.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            Self::TaskFailed { task, .. } => Some(task),
            Self::WithContext { source, .. } => source.failed_task(),
            _ => None,
        }
    }

    /// Check if this error is a cleaning-stage failure (schema or statistics).
    pub fn is_stage_failure(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::ColumnTypeMismatch { .. }
            | Self::NoValidValues(_)
            | Self::NonNumericValue { .. } => true,
            Self::TaskFailed { source, .. } | Self::WithContext { source, .. } => {
                source.is_stage_failure()
            }
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Sqlite(e).with_context(context))
    }
}
