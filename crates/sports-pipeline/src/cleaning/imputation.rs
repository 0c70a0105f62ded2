//! Stage A: statistical imputation.
//!
//! Mean imputation for numeric columns, mode imputation for one categorical
//! column. Fill values are computed once over the whole input column, before
//! any cell is replaced.

use crate::cleaning::statistics::{mean, present};
use crate::error::{PipelineError, Result};
use crate::table::Table;
use crate::types::SemanticType;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Statistic used to fill a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationStrategy {
    Mean,
    Mode,
}

/// The value written into missing cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Number(f64),
    Text(String),
}

/// What imputation did to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputedColumn {
    pub column: String,
    pub strategy: ImputationStrategy,
    pub fill_value: FillValue,
    pub cells_filled: usize,
}

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Replace missing cells of a numeric column with the column mean.
    ///
    /// Fails if the column is not declared numeric or has no non-missing
    /// value to average.
    pub fn apply_mean(table: &Table, column: &str) -> Result<(Table, ImputedColumn)> {
        expect_type(table, column, SemanticType::Numeric)?;

        let values = table.numeric_values(column)?;
        let fill = mean(&present(&values))
            .ok_or_else(|| PipelineError::NoValidValues(column.to_string()))?;

        let cells_filled = values.iter().filter(|v| v.is_none()).count();
        let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(fill)).collect();
        let table = table.with_series(Series::new(column.into(), filled))?;

        debug!("Filled {} cells of '{}' with mean {:.4}", cells_filled, column, fill);
        Ok((
            table,
            ImputedColumn {
                column: column.to_string(),
                strategy: ImputationStrategy::Mean,
                fill_value: FillValue::Number(fill),
                cells_filled,
            },
        ))
    }

    /// Replace missing cells of a categorical column with its mode.
    ///
    /// Ties resolve to the value that reached the maximum frequency first
    /// when scanning rows in order.
    pub fn apply_mode(table: &Table, column: &str) -> Result<(Table, ImputedColumn)> {
        expect_type(table, column, SemanticType::Categorical)?;

        let values = table.text_values(column)?;
        let fill =
            first_mode(&values).ok_or_else(|| PipelineError::NoValidValues(column.to_string()))?;

        let cells_filled = values.iter().filter(|v| v.is_none()).count();
        let filled: Vec<String> = values
            .into_iter()
            .map(|v| v.unwrap_or_else(|| fill.clone()))
            .collect();
        let table = table.with_series(Series::new(column.into(), filled))?;

        debug!("Filled {} cells of '{}' with mode '{}'", cells_filled, column, fill);
        Ok((
            table,
            ImputedColumn {
                column: column.to_string(),
                strategy: ImputationStrategy::Mode,
                fill_value: FillValue::Text(fill),
                cells_filled,
            },
        ))
    }
}

fn expect_type(table: &Table, column: &str, expected: SemanticType) -> Result<()> {
    let actual = table.semantic_type(column)?;
    if actual != expected {
        return Err(PipelineError::ColumnTypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Most frequent non-missing value.
///
/// Among values sharing the highest count, the one whose running count
/// reached that maximum earliest in row order wins.
pub fn first_mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut best: Option<(&str, usize)> = None;

    for value in values.iter().flatten() {
        let count = counts.entry(value.as_str()).or_insert(0);
        *count += 1;
        if best.is_none_or(|(_, max)| *count > max) {
            best = Some((value.as_str(), *count));
        }
    }

    best.map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, TableSchema};

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSpec::new("Attendance", SemanticType::Numeric),
            ColumnSpec::new("Weather", SemanticType::Categorical),
        ])
    }

    fn table(attendance: Vec<Option<f64>>, weather: Vec<Option<&str>>) -> Table {
        let frame = df![
            "Attendance" => attendance,
            "Weather" => weather,
        ]
        .unwrap();
        Table::new(schema(), frame).unwrap()
    }

    fn some(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    // ========================================================================
    // apply_mean() tests
    // ========================================================================

    #[test]
    fn test_apply_mean_basic() {
        let input = table(
            vec![Some(1.0), None, Some(5.0), None],
            vec![Some("Sunny"); 4],
        );

        let (output, record) = StatisticalImputer::apply_mean(&input, "Attendance").unwrap();

        assert_eq!(
            output.numeric_values("Attendance").unwrap(),
            vec![Some(1.0), Some(3.0), Some(5.0), Some(3.0)]
        );
        assert_eq!(record.fill_value, FillValue::Number(3.0));
        assert_eq!(record.cells_filled, 2);
        // Input untouched.
        assert_eq!(input.series("Attendance").unwrap().null_count(), 2);
    }

    #[test]
    fn test_apply_mean_no_nulls() {
        let input = table(vec![Some(1.0), Some(2.0)], vec![Some("Rain"); 2]);
        let (output, record) = StatisticalImputer::apply_mean(&input, "Attendance").unwrap();
        assert_eq!(record.cells_filled, 0);
        assert_eq!(
            output.numeric_values("Attendance").unwrap(),
            vec![Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn test_apply_mean_all_nulls_fails() {
        let input = table(vec![None, None], vec![Some("Rain"); 2]);
        let err = StatisticalImputer::apply_mean(&input, "Attendance").unwrap_err();
        assert_eq!(err.error_code(), "NO_VALID_VALUES");
    }

    #[test]
    fn test_apply_mean_wrong_type_fails() {
        let input = table(vec![Some(1.0)], vec![Some("Rain")]);
        let err = StatisticalImputer::apply_mean(&input, "Weather").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_TYPE_MISMATCH");
    }

    #[test]
    fn test_apply_mean_missing_column_fails() {
        let input = table(vec![Some(1.0)], vec![Some("Rain")]);
        let err = StatisticalImputer::apply_mean(&input, "Goals").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    // ========================================================================
    // apply_mode() tests
    // ========================================================================

    #[test]
    fn test_apply_mode_fills_most_frequent() {
        let mut weather = vec![Some("Sunny"); 5];
        weather.extend([Some("Rain"); 3]);
        weather.push(Some("Snow"));
        weather.extend([None, None]);
        let input = table(vec![Some(1.0); 11], weather);

        let (output, record) = StatisticalImputer::apply_mode(&input, "Weather").unwrap();

        let values = output.text_values("Weather").unwrap();
        assert_eq!(values[9].as_deref(), Some("Sunny"));
        assert_eq!(values[10].as_deref(), Some("Sunny"));
        assert_eq!(record.cells_filled, 2);
        assert_eq!(output.series("Weather").unwrap().null_count(), 0);
    }

    #[test]
    fn test_apply_mode_all_nulls_fails() {
        let input = table(vec![Some(1.0), Some(2.0)], vec![None, None]);
        let err = StatisticalImputer::apply_mode(&input, "Weather").unwrap_err();
        assert_eq!(err.error_code(), "NO_VALID_VALUES");
    }

    // ========================================================================
    // first_mode() tests
    // ========================================================================

    #[test]
    fn test_first_mode_tie_goes_to_first_reaching_max() {
        // Both reach 2; "Rain" gets there first (row 2), before "Sunny" (row 3).
        assert_eq!(
            first_mode(&some(&["Sunny", "Rain", "Rain", "Sunny"])),
            Some("Rain".to_string())
        );
        assert_eq!(
            first_mode(&some(&["Sunny", "Rain", "Sunny", "Rain"])),
            Some("Sunny".to_string())
        );
    }

    #[test]
    fn test_first_mode_ignores_missing() {
        let values = vec![None, Some("Fog".to_string()), None];
        assert_eq!(first_mode(&values), Some("Fog".to_string()));
        assert_eq!(first_mode(&[None, None]), None);
    }
}
