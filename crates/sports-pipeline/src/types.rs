//! Declared schema types.
//!
//! A [`TableSchema`] maps each column name to a [`SemanticType`]. Schemas are
//! declared up front and validated once when a [`crate::table::Table`] is
//! constructed; nothing downstream inspects column types by name.

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Continuous or count values, stored as `Float64`.
    Numeric,
    /// Free-form labels, stored as `String`.
    Categorical,
    /// Calendar dates, stored as ISO-8601 `String`.
    Date,
    /// Integer identifiers, stored as `Int64`.
    Identifier,
}

impl SemanticType {
    /// The polars dtype used to hold values of this type.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Numeric => DataType::Float64,
            Self::Categorical | Self::Date => DataType::String,
            Self::Identifier => DataType::Int64,
        }
    }

    /// SQL column type used by the relational loader.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Numeric => "REAL",
            Self::Identifier => "INTEGER",
            Self::Categorical | Self::Date => "TEXT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
            Self::Date => "date",
            Self::Identifier => "identifier",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}

/// Ordered set of declared columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Schema of the match-level sports dataset.
    pub fn sports() -> Self {
        use SemanticType::*;
        Self::new(vec![
            ColumnSpec::new("Match_ID", Identifier),
            ColumnSpec::new("Date", Date),
            ColumnSpec::new("Team1", Categorical),
            ColumnSpec::new("Team2", Categorical),
            ColumnSpec::new("Attendance", Numeric),
            ColumnSpec::new("Shots_On_Target_Team1", Numeric),
            ColumnSpec::new("Shots_On_Target_Team2", Numeric),
            ColumnSpec::new("Goals", Numeric),
            ColumnSpec::new("Assists", Numeric),
            ColumnSpec::new("Weather", Categorical),
        ])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a column's declared type.
    pub fn semantic_type(&self, name: &str) -> Option<SemanticType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.semantic_type)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Names of all numeric columns, in declared order.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.semantic_type == SemanticType::Numeric)
            .map(|c| c.name.clone())
            .collect()
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::sports()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sports_schema_numeric_columns() {
        let schema = TableSchema::sports();
        assert_eq!(
            schema.numeric_columns(),
            vec![
                "Attendance",
                "Shots_On_Target_Team1",
                "Shots_On_Target_Team2",
                "Goals",
                "Assists"
            ]
        );
        assert_eq!(schema.semantic_type("Weather"), Some(SemanticType::Categorical));
        assert_eq!(schema.semantic_type("Missing"), None);
    }

    #[test]
    fn test_semantic_type_serde() {
        let json = serde_json::to_string(&SemanticType::Identifier).unwrap();
        assert_eq!(json, "\"identifier\"");
        let parsed: SemanticType = serde_json::from_str("\"date\"").unwrap();
        assert_eq!(parsed, SemanticType::Date);
    }
}
