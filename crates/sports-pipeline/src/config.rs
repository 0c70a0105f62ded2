//! Configuration types for the sports data pipeline.
//!
//! The configuration is built once at start-up and passed explicitly to the
//! components that need it. It is never mutated afterwards.

use crate::types::TableSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration of the statistical cleaning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Numeric columns whose missing values are replaced by the column mean.
    pub mean_columns: Vec<String>,

    /// Categorical column whose missing values are replaced by the mode.
    pub mode_column: String,

    /// Rows with any numeric |z-score| above this are removed.
    /// Default: 3.0
    pub z_threshold: f64,

    /// Multiplier applied to the interquartile range for the IQR fences.
    /// Default: 1.5
    pub iqr_multiplier: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            mean_columns: vec![
                "Attendance".to_string(),
                "Shots_On_Target_Team1".to_string(),
                "Shots_On_Target_Team2".to_string(),
                "Goals".to_string(),
                "Assists".to_string(),
            ],
            mode_column: "Weather".to_string(),
            z_threshold: 3.0,
            iqr_multiplier: 1.5,
        }
    }
}

impl CleaningConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(ConfigValidationError::InvalidCutoff {
                field: "z_threshold".to_string(),
                value: self.z_threshold,
            });
        }
        if !(self.iqr_multiplier.is_finite() && self.iqr_multiplier >= 0.0) {
            return Err(ConfigValidationError::InvalidCutoff {
                field: "iqr_multiplier".to_string(),
                value: self.iqr_multiplier,
            });
        }
        if self.mode_column.is_empty() {
            return Err(ConfigValidationError::MissingField("mode_column".to_string()));
        }
        Ok(())
    }
}

/// Location of the raw dataset in object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the object store, e.g. `https://s3.eu-north-1.amazonaws.com`.
    pub endpoint: String,
    pub bucket: String,
    pub key: String,
    /// Bearer token sent with the request. Never logged or serialized.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.eu-north-1.amazonaws.com".to_string(),
            bucket: "capstone-group15".to_string(),
            key: "Sports_Dataset_1M.csv".to_string(),
            token: None,
        }
    }
}

impl StorageConfig {
    /// Path-style URL of the object.
    pub fn object_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket.trim_matches('/'),
            self.key.trim_start_matches('/')
        )
    }
}

/// Relational store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file. Relative paths resolve against the work directory.
    pub path: PathBuf,
    /// Table that receives the cleaned data. Replaced on every load.
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sports.db"),
            table: "sports_data".to_string(),
        }
    }
}

/// File names of the completion markers, relative to the work directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactNames {
    pub raw_data: String,
    pub exploration_report: String,
    pub cleaned_data: String,
    pub load_marker: String,
    pub query_results: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            raw_data: "data.csv".to_string(),
            exploration_report: "exploration_report.txt".to_string(),
            cleaned_data: "cleaned_data.csv".to_string(),
            load_marker: "rds_load_success.txt".to_string(),
            query_results: "query_results.txt".to_string(),
        }
    }
}

/// Configuration for the whole pipeline.
///
/// Use [`PipelineConfig::builder()`] for a fluent setup, or deserialize it
/// from JSON; every field has a default.
///
/// # Example
///
/// ```rust,ignore
/// use sports_pipeline::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .work_dir("./run")
///     .database_path("sports.db")
///     .z_threshold(3.0)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding every artifact and marker.
    /// Default: "output"
    pub work_dir: PathBuf,

    pub storage: StorageConfig,

    pub database: DatabaseConfig,

    pub artifacts: ArtifactNames,

    pub cleaning: CleaningConfig,

    /// Declared schema of the dataset.
    pub schema: TableSchema,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("output"),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            artifacts: ArtifactNames::default(),
            cleaning: CleaningConfig::default(),
            schema: TableSchema::sports(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigValidationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigValidationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an artifact file name against the work directory.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    pub fn database_path(&self) -> PathBuf {
        resolve(&self.work_dir, &self.database.path)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.cleaning.validate()?;

        if self.storage.bucket.is_empty() {
            return Err(ConfigValidationError::MissingField("storage.bucket".to_string()));
        }
        if self.storage.key.is_empty() {
            return Err(ConfigValidationError::MissingField("storage.key".to_string()));
        }
        if !is_sql_identifier(&self.database.table) {
            return Err(ConfigValidationError::InvalidIdentifier(
                self.database.table.clone(),
            ));
        }
        for spec in &self.schema.columns {
            if !is_sql_identifier(&spec.name) {
                return Err(ConfigValidationError::InvalidIdentifier(spec.name.clone()));
            }
        }

        // Imputation columns must be declared with a matching type.
        for column in &self.cleaning.mean_columns {
            match self.schema.semantic_type(column) {
                Some(crate::types::SemanticType::Numeric) => {}
                _ => {
                    return Err(ConfigValidationError::UndeclaredColumn {
                        column: column.clone(),
                        expected: "numeric".to_string(),
                    });
                }
            }
        }
        match self.schema.semantic_type(&self.cleaning.mode_column) {
            Some(crate::types::SemanticType::Categorical) => {}
            _ => {
                return Err(ConfigValidationError::UndeclaredColumn {
                    column: self.cleaning.mode_column.clone(),
                    expected: "categorical".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Names interpolated into SQL must be plain identifiers.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid value for '{field}': {value}")]
    InvalidCutoff { field: String, value: f64 },

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("'{0}' is not a valid SQL identifier")]
    InvalidIdentifier(String),

    #[error("Imputation column '{column}' must be declared as {expected}")]
    UndeclaredColumn { column: String, expected: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl From<ConfigValidationError> for crate::error::PipelineError {
    fn from(e: ConfigValidationError) -> Self {
        crate::error::PipelineError::InvalidConfig(e.to_string())
    }
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    base: Option<PipelineConfig>,
    work_dir: Option<PathBuf>,
    endpoint: Option<String>,
    bucket: Option<String>,
    key: Option<String>,
    token: Option<String>,
    database_path: Option<PathBuf>,
    table: Option<String>,
    cleaning: Option<CleaningConfig>,
    z_threshold: Option<f64>,
    iqr_multiplier: Option<f64>,
    schema: Option<TableSchema>,
}

impl PipelineConfigBuilder {
    /// Start from an existing configuration (e.g. one read from a file).
    pub fn base(mut self, config: PipelineConfig) -> Self {
        self.base = Some(config);
        self
    }

    /// Set the directory holding every artifact.
    pub fn work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(path.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the bearer token used against object storage.
    pub fn storage_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Replace the whole cleaning configuration.
    pub fn cleaning(mut self, cleaning: CleaningConfig) -> Self {
        self.cleaning = Some(cleaning);
        self
    }

    pub fn z_threshold(mut self, threshold: f64) -> Self {
        self.z_threshold = Some(threshold);
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = Some(multiplier);
        self
    }

    pub fn schema(mut self, schema: TableSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Build the configuration, validating all values.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let mut config = self.base.unwrap_or_default();

        if let Some(work_dir) = self.work_dir {
            config.work_dir = work_dir;
        }
        if let Some(endpoint) = self.endpoint {
            config.storage.endpoint = endpoint;
        }
        if let Some(bucket) = self.bucket {
            config.storage.bucket = bucket;
        }
        if let Some(key) = self.key {
            config.storage.key = key;
        }
        if let Some(token) = self.token {
            config.storage.token = Some(token);
        }
        if let Some(path) = self.database_path {
            config.database.path = path;
        }
        if let Some(table) = self.table {
            config.database.table = table;
        }
        if let Some(cleaning) = self.cleaning {
            config.cleaning = cleaning;
        }
        if let Some(threshold) = self.z_threshold {
            config.cleaning.z_threshold = threshold;
        }
        if let Some(multiplier) = self.iqr_multiplier {
            config.cleaning.iqr_multiplier = multiplier;
        }
        if let Some(schema) = self.schema {
            config.schema = schema;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, SemanticType};

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.cleaning.z_threshold, 3.0);
        assert_eq!(config.cleaning.iqr_multiplier, 1.5);
        assert_eq!(config.cleaning.mode_column, "Weather");
        assert_eq!(config.cleaning.mean_columns.len(), 5);
        assert_eq!(config.database.table, "sports_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .work_dir("/tmp/run")
            .bucket("other-bucket")
            .z_threshold(2.5)
            .iqr_multiplier(3.0)
            .database_path("db/sports.sqlite")
            .build()
            .unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.storage.bucket, "other-bucket");
        assert_eq!(config.cleaning.z_threshold, 2.5);
        assert_eq!(config.cleaning.iqr_multiplier, 3.0);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/run/db/sports.sqlite"));
    }

    #[test]
    fn test_validation_invalid_z_threshold() {
        let result = PipelineConfig::builder().z_threshold(0.0).build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidCutoff { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_table_name() {
        let result = PipelineConfig::builder().table("sports; DROP TABLE x").build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_validation_mode_column_must_be_categorical() {
        let schema = TableSchema::new(vec![
            ColumnSpec::new("Attendance", SemanticType::Numeric),
            ColumnSpec::new("Shots_On_Target_Team1", SemanticType::Numeric),
            ColumnSpec::new("Shots_On_Target_Team2", SemanticType::Numeric),
            ColumnSpec::new("Goals", SemanticType::Numeric),
            ColumnSpec::new("Assists", SemanticType::Numeric),
            ColumnSpec::new("Weather", SemanticType::Numeric),
        ]);
        let result = PipelineConfig::builder().schema(schema).build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::UndeclaredColumn { .. })
        ));
    }

    #[test]
    fn test_object_url() {
        let storage = StorageConfig {
            endpoint: "http://localhost:9000/".to_string(),
            bucket: "bucket".to_string(),
            key: "/data/file.csv".to_string(),
            token: None,
        };
        assert_eq!(storage.object_url(), "http://localhost:9000/bucket/data/file.csv");
    }

    #[test]
    fn test_config_from_json_partial() {
        let json = r#"{
            "work_dir": "run",
            "cleaning": { "z_threshold": 2.0 },
            "storage": { "bucket": "b", "key": "k.csv", "token": "secret" }
        }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("run"));
        assert_eq!(config.cleaning.z_threshold, 2.0);
        assert_eq!(config.cleaning.iqr_multiplier, 1.5);
        assert_eq!(config.storage.token.as_deref(), Some("secret"));

        let serialized = serde_json::to_string(&config).unwrap();
        assert!(!serialized.contains("secret"));
    }
}
