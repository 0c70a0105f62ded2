//! Statistical cleaning engine.
//!
//! Cleaning runs as a sequence of named stages, each taking an immutable
//! [`Table`] and returning a new one:
//!
//! 1. `imputation` - mean fill for numeric columns, mode fill for one
//!    categorical column
//! 2. `z_score` - drop rows with any numeric |z| above the cutoff
//! 3. `iqr` - on the survivors, drop rows outside the IQR fences
//!
//! Any schema or statistics failure stops the engine and is returned to the
//! caller; nothing is logged-and-skipped.

pub mod imputation;
pub mod outliers;
pub mod statistics;

pub use imputation::{FillValue, ImputationStrategy, ImputedColumn, StatisticalImputer};
pub use outliers::{ColumnFence, FilterReport, IqrFilter, OutlierFilter, ZScoreFilter};

use crate::config::CleaningConfig;
use crate::error::{Result, ResultExt};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Summary of a cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub imputed: Vec<ImputedColumn>,
    pub z_score: FilterReport,
    pub iqr: FilterReport,
}

impl CleaningReport {
    pub fn rows_out(&self) -> usize {
        self.iqr.rows_after
    }
}

/// Intermediate tables of one run, kept for inspection and testing.
#[derive(Debug, Clone)]
pub struct CleaningStages {
    pub imputed: Table,
    pub z_filtered: Table,
    pub cleaned: Table,
}

/// Runs imputation and two-pass outlier removal.
#[derive(Debug, Clone)]
pub struct CleaningEngine {
    config: CleaningConfig,
}

static_assertions::assert_impl_all!(CleaningEngine: Send, Sync);

impl CleaningEngine {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Clean a table, returning the final table and a report.
    pub fn clean(&self, raw: &Table) -> Result<(Table, CleaningReport)> {
        let (stages, report) = self.run_stages(raw)?;
        Ok((stages.cleaned, report))
    }

    /// Clean a table, returning every intermediate table.
    pub fn run_stages(&self, raw: &Table) -> Result<(CleaningStages, CleaningReport)> {
        info!("Cleaning {} rows", raw.height());

        let (imputed, imputed_columns) = self.impute(raw).context("Imputation stage")?;

        let numeric = imputed.schema().numeric_columns();
        let (z_filtered, z_report) = ZScoreFilter::new(self.config.z_threshold)
            .apply(&imputed, &numeric)
            .context("Z-score stage")?;
        let (cleaned, iqr_report) = IqrFilter::new(self.config.iqr_multiplier)
            .apply(&z_filtered, &numeric)
            .context("IQR stage")?;

        info!(
            "Cleaning complete: {} -> {} (z-score) -> {} (IQR) rows",
            imputed.height(),
            z_filtered.height(),
            cleaned.height()
        );

        let report = CleaningReport {
            rows_in: raw.height(),
            imputed: imputed_columns,
            z_score: z_report,
            iqr: iqr_report,
        };
        Ok((
            CleaningStages {
                imputed,
                z_filtered,
                cleaned,
            },
            report,
        ))
    }

    /// Stage A alone.
    pub fn impute(&self, raw: &Table) -> Result<(Table, Vec<ImputedColumn>)> {
        let mut table = raw.clone();
        let mut records = Vec::with_capacity(self.config.mean_columns.len() + 1);

        for column in &self.config.mean_columns {
            let (next, record) = StatisticalImputer::apply_mean(&table, column)?;
            table = next;
            records.push(record);
        }

        let (table, record) = StatisticalImputer::apply_mode(&table, &self.config.mode_column)?;
        records.push(record);

        Ok((table, records))
    }
}

impl Default for CleaningEngine {
    fn default() -> Self {
        Self::new(CleaningConfig::default())
    }
}
