//! Relational store: full-replace load and the fixed aggregate query.

use crate::error::{PipelineError, Result, ResultExt};
use crate::scheduler::{FileTarget, TaskAction};
use crate::table::{Table, TolerantReader};
use crate::types::{SemanticType, TableSchema};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The aggregate run by the query task. `{table}` is replaced by the
/// configured table name.
pub const AVERAGE_ATTENDANCE_QUERY: &str =
    "SELECT Weather, AVG(Attendance) AS Avg_Attendance FROM {table} GROUP BY Weather";

/// A SQLite database holding one table of cleaned data.
#[derive(Debug, Clone)]
pub struct SqlStore {
    path: PathBuf,
    table: String,
}

impl SqlStore {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(format!("Creating {}", parent.display()))?;
        }
        Connection::open(&self.path).context(format!("Opening {}", self.path.display()))
    }

    /// Drop and recreate the table, then insert every row of `data`.
    ///
    /// Runs in one transaction: on failure the previous table is untouched.
    pub fn replace_table(&self, data: &Table) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction().context("Starting load transaction")?;

        let columns: Vec<String> = data
            .schema()
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.semantic_type.sql_type()))
            .collect();
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});",
            table = quote_identifier(&self.table),
            columns = columns.join(", ")
        ))
        .context(format!("Recreating table '{}'", self.table))?;

        let cells = column_values(data)?;
        let names: Vec<String> = data.schema().names().map(quote_identifier).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            names.join(", "),
            placeholders.join(", ")
        );

        {
            let mut stmt = tx.prepare(&insert).context("Preparing insert")?;
            for row in 0..data.height() {
                stmt.execute(params_from_iter(cells.iter().map(|column| &column[row])))
                    .map_err(|e| {
                        PipelineError::Persistence(format!("inserting row {}: {}", row, e))
                    })?;
            }
        }

        tx.commit().context("Committing load")?;
        info!(
            "Loaded {} rows into '{}' at {}",
            data.height(),
            self.table,
            self.path.display()
        );
        Ok(data.height())
    }

    /// Run the fixed aggregate query.
    pub fn average_attendance_by_weather(&self) -> Result<Vec<Vec<Value>>> {
        let sql = AVERAGE_ATTENDANCE_QUERY.replace("{table}", &quote_identifier(&self.table));
        self.query(&sql)
    }

    fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| PipelineError::Persistence(format!("preparing query: {}", e)))?;
        let width = stmt.column_count();
        debug!("Running query: {}", sql);

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })
            .context("Running query")?;
        rows.collect::<rusqlite::Result<Vec<Vec<Value>>>>()
            .context("Reading query results")
    }
}

/// Quote an identifier for SQLite.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Every column of `data` as SQL values, in schema order.
fn column_values(data: &Table) -> Result<Vec<Vec<Value>>> {
    data.schema()
        .columns
        .iter()
        .map(|spec| -> Result<Vec<Value>> {
            let values = match spec.semantic_type {
                SemanticType::Numeric => data
                    .numeric_values(&spec.name)?
                    .into_iter()
                    .map(|v| v.map_or(Value::Null, Value::Real))
                    .collect(),
                SemanticType::Identifier => data
                    .integer_values(&spec.name)?
                    .into_iter()
                    .map(|v| v.map_or(Value::Null, Value::Integer))
                    .collect(),
                SemanticType::Categorical | SemanticType::Date => data
                    .text_values(&spec.name)?
                    .into_iter()
                    .map(|v| v.map_or(Value::Null, Value::Text))
                    .collect(),
            };
            Ok(values)
        })
        .collect()
}

/// Render a row the way a tuple literal prints, e.g. `('Sunny', 24512.5)`.
pub fn render_tuple_row(values: &[Value]) -> String {
    let fields: Vec<String> = values.iter().map(render_value).collect();
    match fields.as_slice() {
        [single] => format!("({},)", single),
        _ => format!("({})", fields.join(", ")),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 => format!("{:.1}", f),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => quote_text(s),
        Value::Blob(bytes) => format!("b{}", quote_text(&String::from_utf8_lossy(bytes))),
    }
}

/// Single-quoted unless the text contains a single quote and no double quote.
fn quote_text(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\n', "\\n");
    if s.contains('\'') && !s.contains('"') {
        format!("\"{}\"", escaped)
    } else {
        format!("'{}'", escaped.replace('\'', "\\'"))
    }
}

/// Loads the cleaned dataset into the store and writes the success marker.
pub struct LoadTask {
    schema: TableSchema,
    store: SqlStore,
    input: PathBuf,
    marker: FileTarget,
}

impl LoadTask {
    pub fn new(schema: TableSchema, store: SqlStore, input: impl Into<PathBuf>, marker: FileTarget) -> Self {
        Self {
            schema,
            store,
            input: input.into(),
            marker,
        }
    }
}

impl TaskAction for LoadTask {
    fn run(&self) -> Result<()> {
        let (cleaned, stats) = TolerantReader::new(self.schema.clone()).read_path(&self.input)?;
        if stats.rows_dropped > 0 {
            return Err(PipelineError::MalformedInput(format!(
                "{} rows of {} could not be parsed",
                stats.rows_dropped,
                self.input.display()
            )));
        }
        let rows = self.store.replace_table(&cleaned)?;
        self.marker.write_all(
            format!("Load successful: {} rows into {}\n", rows, self.store.table).as_bytes(),
        )
    }
}

/// Runs the aggregate query and writes one tuple line per result row.
pub struct QueryTask {
    store: SqlStore,
    output: FileTarget,
}

impl QueryTask {
    pub fn new(store: SqlStore, output: FileTarget) -> Self {
        Self { store, output }
    }
}

impl TaskAction for QueryTask {
    fn run(&self) -> Result<()> {
        let rows = self.store.average_attendance_by_weather()?;
        let mut text = String::new();
        for row in &rows {
            text.push_str(&render_tuple_row(row));
            text.push('\n');
        }
        self.output.write_all(text.as_bytes())?;
        info!("Query returned {} rows", rows.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSpec;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSpec::new("Match_ID", SemanticType::Identifier),
            ColumnSpec::new("Attendance", SemanticType::Numeric),
            ColumnSpec::new("Weather", SemanticType::Categorical),
        ])
    }

    fn table(rows: &[(i64, f64, &str)]) -> Table {
        let frame = df![
            "Match_ID" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "Attendance" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "Weather" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
        ]
        .unwrap();
        Table::new(schema(), frame).unwrap()
    }

    #[test]
    fn test_render_tuple_row() {
        assert_eq!(
            render_tuple_row(&[Value::Text("Sunny".to_string()), Value::Real(24512.5)]),
            "('Sunny', 24512.5)"
        );
        assert_eq!(
            render_tuple_row(&[Value::Text("Rain".to_string()), Value::Real(20000.0)]),
            "('Rain', 20000.0)"
        );
        assert_eq!(render_tuple_row(&[Value::Null, Value::Integer(3)]), "(None, 3)");
        assert_eq!(render_tuple_row(&[Value::Integer(1)]), "(1,)");
        assert_eq!(render_tuple_row(&[Value::Text("it's".to_string())]), "(\"it's\",)");
    }

    #[test]
    fn test_replace_table_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlStore::new(dir.path().join("sports.db"), "sports_data");

        let first = table(&[(1, 100.0, "Sunny"), (2, 200.0, "Sunny"), (3, 50.0, "Rain")]);
        assert_eq!(store.replace_table(&first).unwrap(), 3);
        let second = table(&[(4, 10.0, "Snow"), (5, 30.0, "Snow")]);
        store.replace_table(&second).unwrap();

        let rows = store.average_attendance_by_weather().unwrap();
        assert_eq!(rows, vec![vec![Value::Text("Snow".to_string()), Value::Real(20.0)]]);
    }

    #[test]
    fn test_column_types_follow_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlStore::new(dir.path().join("sports.db"), "sports_data");
        store.replace_table(&table(&[(1, 1.5, "Sunny")])).unwrap();

        let rows = store
            .query("SELECT typeof(Match_ID), typeof(Attendance), typeof(Weather) FROM sports_data")
            .unwrap();
        assert_eq!(
            rows[0],
            vec![
                Value::Text("integer".to_string()),
                Value::Text("real".to_string()),
                Value::Text("text".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_missing_table_is_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlStore::new(dir.path().join("empty.db"), "sports_data");
        let err = store.average_attendance_by_weather().unwrap_err();
        assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");
    }
}
