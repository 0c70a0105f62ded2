//! Cleaning task: tolerant parse, cleaning engine, cleaned CSV.

use crate::cleaning::{CleaningEngine, CleaningReport};
use crate::config::CleaningConfig;
use crate::error::{Result, ResultExt};
use crate::scheduler::{FileTarget, TaskAction};
use crate::table::{ReadStats, TolerantReader};
use crate::types::TableSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// What one cleaning run read and produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanSummary {
    pub read: ReadStats,
    pub cleaning: CleaningReport,
}

/// Cleans the raw dataset into the cleaned-data target.
pub struct CleanTask {
    schema: TableSchema,
    engine: CleaningEngine,
    input: PathBuf,
    output: FileTarget,
}

impl CleanTask {
    pub fn new(
        schema: TableSchema,
        cleaning: CleaningConfig,
        input: impl Into<PathBuf>,
        output: FileTarget,
    ) -> Self {
        Self {
            schema,
            engine: CleaningEngine::new(cleaning),
            input: input.into(),
            output,
        }
    }

    pub fn clean(&self) -> Result<CleanSummary> {
        let (raw, read) = TolerantReader::new(self.schema.clone()).read_path(&self.input)?;
        let (cleaned, cleaning) = self.engine.clean(&raw)?;

        let mut writer = self.output.writer()?;
        cleaned.write_csv(&mut writer)?;
        writer
            .finish()
            .context(format!("Storing {}", self.output.path().display()))?;

        info!(
            "Cleaned data written to {}: {} rows in, {} rows out",
            self.output.path().display(),
            read.rows_read,
            cleaning.rows_out()
        );
        if let Ok(json) = serde_json::to_string(&cleaning) {
            debug!("Cleaning report: {}", json);
        }
        Ok(CleanSummary { read, cleaning })
    }
}

impl TaskAction for CleanTask {
    fn run(&self) -> Result<()> {
        self.clean().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, SemanticType};
    use std::fs;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSpec::new("Match_ID", SemanticType::Identifier),
            ColumnSpec::new("Attendance", SemanticType::Numeric),
            ColumnSpec::new("Weather", SemanticType::Categorical),
        ])
    }

    fn config() -> CleaningConfig {
        CleaningConfig {
            mean_columns: vec!["Attendance".to_string()],
            mode_column: "Weather".to_string(),
            ..CleaningConfig::default()
        }
    }

    #[test]
    fn test_clean_writes_cleaned_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.csv");
        fs::write(
            &input,
            "Match_ID,Attendance,Weather\n1,100,Sunny\n2,,Rain\n3,110,\n4,bad,Sunny\n5,90,Sunny\n",
        )
        .unwrap();
        let output = FileTarget::new(dir.path().join("cleaned_data.csv"));

        let summary = CleanTask::new(schema(), config(), &input, output.clone())
            .clean()
            .unwrap();

        assert_eq!(summary.read.rows_dropped, 1);
        assert_eq!(summary.cleaning.rows_in, 4);
        let text = fs::read_to_string(output.path()).unwrap();
        assert!(text.starts_with("Match_ID,Attendance,Weather\n"));
        assert_eq!(text.lines().count(), summary.cleaning.rows_out() + 1);
        assert!(text.contains("2,100.0,Rain"));
        assert!(text.contains("3,110.0,Sunny"));
    }

    #[test]
    fn test_clean_failure_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.csv");
        fs::write(&input, "Match_ID,Attendance,Weather\n1,,\n2,,\n").unwrap();
        let output = FileTarget::new(dir.path().join("cleaned_data.csv"));

        let err = CleanTask::new(schema(), config(), &input, output.clone())
            .clean()
            .unwrap_err();

        assert_eq!(err.error_code(), "NO_VALID_VALUES");
        assert!(!output.path().exists());
    }
}
