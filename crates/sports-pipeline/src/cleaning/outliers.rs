//! Stage B: outlier removal.
//!
//! Contains the two row filters applied after imputation. Each filter is a
//! pure function of the table it receives: statistics are computed over that
//! table's rows only, and a new table is returned.

use crate::cleaning::statistics::{mean, present, quartiles, std_dev};
use crate::error::Result;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Acceptance interval computed for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFence {
    pub column: String,
    pub lower: f64,
    pub upper: f64,
    /// Rows whose value in this column fell outside the fence.
    pub rows_flagged: usize,
}

/// Outcome of one filter pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub stage: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub fences: Vec<ColumnFence>,
}

impl FilterReport {
    pub fn rows_removed(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// A row filter over numeric columns.
///
/// Implementors only decide the fence for a column; flagging rows, combining
/// columns and building the surviving table is shared. Missing values never
/// flag a row.
pub trait OutlierFilter {
    /// Stage name used in reports and logs.
    fn stage(&self) -> &'static str;

    /// Fence for a column given its non-missing values, or `None` when the
    /// column cannot flag anything (e.g. no spread).
    fn fence(&self, values: &[f64]) -> Option<(f64, f64)>;

    /// Apply the filter, returning the surviving rows as a new table.
    fn apply(&self, table: &Table, columns: &[String]) -> Result<(Table, FilterReport)> {
        let mut keep = vec![true; table.height()];
        let mut fences = Vec::new();

        for column in columns {
            let values = table.numeric_values(column)?;
            let Some((lower, upper)) = self.fence(&present(&values)) else {
                debug!("{}: '{}' has no usable spread, skipped", self.stage(), column);
                continue;
            };

            let mut rows_flagged = 0;
            for (row, value) in values.iter().enumerate() {
                if let Some(v) = value
                    && (*v < lower || *v > upper)
                {
                    keep[row] = false;
                    rows_flagged += 1;
                }
            }

            fences.push(ColumnFence {
                column: column.clone(),
                lower,
                upper,
                rows_flagged,
            });
        }

        let filtered = table.filter_rows(&keep)?;
        let report = FilterReport {
            stage: self.stage().to_string(),
            rows_before: table.height(),
            rows_after: filtered.height(),
            fences,
        };
        debug!(
            "{}: removed {} of {} rows",
            report.stage,
            report.rows_removed(),
            report.rows_before
        );
        Ok((filtered, report))
    }
}

/// Removes rows whose absolute z-score exceeds `threshold` in any column.
///
/// Uses the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreFilter {
    pub threshold: f64,
}

impl ZScoreFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl OutlierFilter for ZScoreFilter {
    fn stage(&self) -> &'static str {
        "z_score"
    }

    fn fence(&self, values: &[f64]) -> Option<(f64, f64)> {
        let mean = mean(values)?;
        let std = std_dev(values, 0)?;
        if std == 0.0 {
            return None;
        }
        // |v - mean| / std > t  <=>  v outside [mean - t*std, mean + t*std]
        Some((mean - self.threshold * std, mean + self.threshold * std))
    }
}

/// Removes rows outside `[Q1 - k*IQR, Q3 + k*IQR]` in any column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrFilter {
    pub multiplier: f64,
}

impl IqrFilter {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl OutlierFilter for IqrFilter {
    fn stage(&self) -> &'static str {
        "iqr"
    }

    fn fence(&self, values: &[f64]) -> Option<(f64, f64)> {
        let (q1, q3) = quartiles(values)?;
        let iqr = q3 - q1;
        Some((q1 - self.multiplier * iqr, q3 + self.multiplier * iqr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, SemanticType, TableSchema};
    use polars::prelude::*;

    fn table(values: Vec<Option<f64>>) -> Table {
        let schema = TableSchema::new(vec![ColumnSpec::new("value", SemanticType::Numeric)]);
        Table::new(schema, df!["value" => values].unwrap()).unwrap()
    }

    fn columns() -> Vec<String> {
        vec!["value".to_string()]
    }

    #[test]
    fn test_z_score_removes_extreme_value() {
        let mut values: Vec<Option<f64>> = (0..20).map(|i| Some(10.0 + (i % 3) as f64)).collect();
        values.push(Some(1000.0));
        let input = table(values);

        let (output, report) = ZScoreFilter::new(3.0).apply(&input, &columns()).unwrap();

        assert_eq!(output.height(), 20);
        assert_eq!(report.rows_removed(), 1);
        assert_eq!(report.fences[0].rows_flagged, 1);
        assert_eq!(input.height(), 21);
    }

    #[test]
    fn test_z_score_constant_column_keeps_everything() {
        let input = table(vec![Some(5.0); 6]);
        let (output, report) = ZScoreFilter::new(3.0).apply(&input, &columns()).unwrap();
        assert_eq!(output.height(), 6);
        assert!(report.fences.is_empty());
    }

    #[test]
    fn test_z_score_ignores_missing_values() {
        let mut values: Vec<Option<f64>> = (0..20).map(|i| Some(i as f64)).collect();
        values.push(None);
        let input = table(values);
        let (output, _) = ZScoreFilter::new(3.0).apply(&input, &columns()).unwrap();
        // The null row is neither treated as zero nor removed.
        assert_eq!(output.height(), 21);
    }

    #[test]
    fn test_iqr_removes_outlier() {
        let values = (1..=9).map(|v| Some(v as f64)).chain([Some(100.0)]).collect();
        let input = table(values);

        let (output, report) = IqrFilter::new(1.5).apply(&input, &columns()).unwrap();

        assert_eq!(output.height(), 9);
        // Q1 = 3.25, Q3 = 7.75, IQR = 4.5
        let fence = &report.fences[0];
        assert!((fence.lower - (3.25 - 6.75)).abs() < 1e-9);
        assert!((fence.upper - (7.75 + 6.75)).abs() < 1e-9);
    }

    #[test]
    fn test_iqr_keeps_values_on_fence() {
        // Q1 = 2, Q3 = 4, fences [-1, 7]; 7 sits exactly on the upper fence.
        let input = table(vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(7.0)]);
        let (output, _) = IqrFilter::new(1.5).apply(&input, &columns()).unwrap();
        assert_eq!(output.height(), 5);
    }

    #[test]
    fn test_filter_on_empty_table() {
        let input = table(vec![]);
        let (output, report) = IqrFilter::new(1.5).apply(&input, &columns()).unwrap();
        assert_eq!(output.height(), 0);
        assert_eq!(report.rows_removed(), 0);
    }
}
