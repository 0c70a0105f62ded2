//! Schema-checked tables and the tolerant delimited-text reader.
//!
//! A [`Table`] pairs a polars [`DataFrame`] with the [`TableSchema`] it was
//! validated against. Construction is the only place column presence and
//! dtype are checked; every later stage relies on that guarantee.

use crate::error::{PipelineError, Result, ResultExt};
use crate::types::{SemanticType, TableSchema};
use crate::utils::{
    RecordScan, is_missing_marker, parse_date, parse_identifier, parse_numeric, scan_record,
    split_record,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// An immutable, schema-validated table.
///
/// Cloning is cheap: polars columns are reference counted.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    frame: DataFrame,
}

impl Table {
    /// Validate `frame` against `schema`.
    ///
    /// Every declared column must be present with the dtype of its semantic
    /// type. Columns are reordered to declared order; undeclared columns are
    /// dropped.
    pub fn new(schema: TableSchema, frame: DataFrame) -> Result<Self> {
        for spec in &schema.columns {
            let column = frame
                .column(&spec.name)
                .map_err(|_| PipelineError::ColumnNotFound(spec.name.clone()))?;
            let expected = spec.semantic_type.dtype();
            if column.dtype() != &expected {
                return Err(PipelineError::ColumnTypeMismatch {
                    column: spec.name.clone(),
                    expected: format!("{} ({})", spec.semantic_type, expected),
                    actual: column.dtype().to_string(),
                });
            }
        }

        let frame = frame
            .select(schema.names())
            .context("Selecting declared columns")?;
        Ok(Self { schema, frame })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    /// Borrow a column as a series.
    pub fn series(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| PipelineError::ColumnNotFound(name.to_string()))
    }

    /// Declared type of a column, failing if it is not part of the schema.
    pub fn semantic_type(&self, name: &str) -> Result<SemanticType> {
        self.schema
            .semantic_type(name)
            .ok_or_else(|| PipelineError::ColumnNotFound(name.to_string()))
    }

    /// Values of a numeric column.
    ///
    /// Fails with [`PipelineError::NonNumericValue`] if a non-finite value is
    /// present, so NaN never silently propagates into a statistic.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let series = self.series(name)?;
        let values = series
            .f64()
            .map_err(|_| PipelineError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: SemanticType::Numeric.to_string(),
                actual: series.dtype().to_string(),
            })?;

        values
            .into_iter()
            .enumerate()
            .map(|(row, value)| match value {
                Some(v) if !v.is_finite() => Err(PipelineError::NonNumericValue {
                    column: name.to_string(),
                    row,
                    value: v.to_string(),
                }),
                other => Ok(other),
            })
            .collect()
    }

    /// Values of an identifier column.
    pub fn integer_values(&self, name: &str) -> Result<Vec<Option<i64>>> {
        let series = self.series(name)?;
        let values = series
            .i64()
            .map_err(|_| PipelineError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: SemanticType::Identifier.to_string(),
                actual: series.dtype().to_string(),
            })?;
        Ok(values.into_iter().collect())
    }

    /// Values of a string-backed column (categorical or date).
    pub fn text_values(&self, name: &str) -> Result<Vec<Option<String>>> {
        let series = self.series(name)?;
        let values = series
            .str()
            .map_err(|_| PipelineError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: "string".to_string(),
                actual: series.dtype().to_string(),
            })?;
        Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
    }

    /// Return a new table with one column replaced.
    pub fn with_series(&self, series: Series) -> Result<Self> {
        let name = series.name().to_string();
        let mut frame = self.frame.clone();
        frame
            .replace(&name, series)
            .context(format!("Replacing column '{}'", name))?;
        Self::new(self.schema.clone(), frame)
    }

    /// Return a new table keeping only rows where `keep` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Result<Self> {
        let mask = BooleanChunked::from_slice("mask".into(), keep);
        let frame = self.frame.filter(&mask).context("Filtering rows")?;
        Ok(Self {
            schema: self.schema.clone(),
            frame,
        })
    }

    /// Write the table as comma-separated text with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut frame = self.frame.clone();
        CsvWriter::new(writer)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(&mut frame)
            .context("Writing CSV")?;
        Ok(())
    }
}

/// Counters reported by the tolerant reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStats {
    /// Data lines seen (blank lines excluded).
    pub rows_read: usize,
    /// Rows dropped because of a wrong field count or an unparsable field.
    pub rows_dropped: usize,
}

impl ReadStats {
    pub fn rows_kept(&self) -> usize {
        self.rows_read - self.rows_dropped
    }
}

/// Typed buffer for one column under construction.
enum ColumnBuffer {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

/// A parsed, not yet committed cell.
enum Cell {
    Float(Option<f64>),
    Int(Option<i64>),
    Text(Option<String>),
}

impl ColumnBuffer {
    fn for_type(semantic_type: SemanticType) -> Self {
        match semantic_type {
            SemanticType::Numeric => Self::Float(Vec::new()),
            SemanticType::Identifier => Self::Int(Vec::new()),
            SemanticType::Categorical | SemanticType::Date => Self::Text(Vec::new()),
        }
    }

    fn push(&mut self, cell: Cell) {
        match (self, cell) {
            (Self::Float(v), Cell::Float(c)) => v.push(c),
            (Self::Int(v), Cell::Int(c)) => v.push(c),
            (Self::Text(v), Cell::Text(c)) => v.push(c),
            // Buffers and cells are both derived from the same semantic type.
            _ => unreachable!("cell type does not match column buffer"),
        }
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            Self::Float(v) => Series::new(name.into(), v).into_column(),
            Self::Int(v) => Series::new(name.into(), v).into_column(),
            Self::Text(v) => Series::new(name.into(), v).into_column(),
        }
    }
}

fn parse_cell(raw: &str, semantic_type: SemanticType) -> Option<Cell> {
    if is_missing_marker(raw) {
        return Some(match semantic_type {
            SemanticType::Numeric => Cell::Float(None),
            SemanticType::Identifier => Cell::Int(None),
            SemanticType::Categorical | SemanticType::Date => Cell::Text(None),
        });
    }

    match semantic_type {
        SemanticType::Numeric => parse_numeric(raw).map(|v| Cell::Float(Some(v))),
        SemanticType::Identifier => parse_identifier(raw).map(|v| Cell::Int(Some(v))),
        SemanticType::Date => parse_date(raw).map(|v| Cell::Text(Some(v))),
        SemanticType::Categorical => Some(Cell::Text(Some(raw.trim().to_string()))),
    }
}

/// Physical lines a quoted field may continue over before the record is
/// treated as broken.
pub const MAX_CONTINUATION_LINES: usize = 64;

/// Reads delimited text into a [`Table`], dropping malformed rows one by one.
///
/// A row is malformed when its field count differs from the header's, when
/// its quoting is broken, when it is not valid UTF-8, or when a declared
/// column's field cannot be parsed as the declared type. Missing-value
/// markers are not malformed; they become nulls.
pub struct TolerantReader {
    schema: TableSchema,
    delimiter: char,
}

impl TolerantReader {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            delimiter: ',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read a file from disk.
    pub fn read_path(&self, path: &Path) -> Result<(Table, ReadStats)> {
        let file = File::open(path).context(format!("Opening {}", path.display()))?;
        let (table, stats) = self.read(BufReader::new(file))?;
        info!(
            "Read {} rows from {} ({} malformed rows dropped)",
            stats.rows_kept(),
            path.display(),
            stats.rows_dropped
        );
        Ok((table, stats))
    }

    /// Read from any buffered source.
    ///
    /// A quoted field may span physical lines. If a quote is still open after
    /// [`MAX_CONTINUATION_LINES`] further lines, or at end of input, only the
    /// line that opened it is dropped and reading resumes on the next line.
    pub fn read<R: BufRead>(&self, reader: R) -> Result<(Table, ReadStats)> {
        let mut source = LineSource::new(reader.split(b'\n'));
        let mut stats = ReadStats::default();

        let header = loop {
            match source.next()? {
                Some((_, line)) => {
                    let line = line.ok_or_else(|| {
                        PipelineError::MalformedInput("header is not valid UTF-8".to_string())
                    })?;
                    if !line.trim().is_empty() {
                        break split_record(&line, self.delimiter).ok_or_else(|| {
                            PipelineError::MalformedInput("unbalanced quotes in header".to_string())
                        })?;
                    }
                }
                None => return Err(PipelineError::MalformedInput("input is empty".to_string())),
            }
        };
        let header: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();

        // Position of every declared column within a record.
        let mut positions = Vec::with_capacity(self.schema.len());
        for spec in &self.schema.columns {
            let index = header
                .iter()
                .position(|h| h == &spec.name)
                .ok_or_else(|| PipelineError::ColumnNotFound(spec.name.clone()))?;
            positions.push((index, spec.semantic_type));
        }

        let mut buffers: Vec<ColumnBuffer> = self
            .schema
            .columns
            .iter()
            .map(|spec| ColumnBuffer::for_type(spec.semantic_type))
            .collect();

        while let Some((line_no, line)) = source.next()? {
            let Some(mut record) = line else {
                stats.rows_read += 1;
                stats.rows_dropped += 1;
                debug!("Dropping line {}: not valid UTF-8", line_no);
                continue;
            };
            if record.trim().is_empty() {
                continue;
            }
            stats.rows_read += 1;

            let mut continuation = Vec::new();
            let scan = loop {
                let scan = scan_record(&record, self.delimiter);
                if scan != RecordScan::OpenQuote || continuation.len() >= MAX_CONTINUATION_LINES {
                    break scan;
                }
                match source.next()? {
                    Some((next_no, Some(next))) => {
                        record.push('\n');
                        record.push_str(&next);
                        continuation.push((next_no, Some(next)));
                    }
                    Some(undecodable) => {
                        continuation.push(undecodable);
                        break RecordScan::OpenQuote;
                    }
                    None => break RecordScan::OpenQuote,
                }
            };

            let cells = match scan {
                RecordScan::Complete(fields) => self.parse_fields(&fields, header.len(), &positions),
                RecordScan::OpenQuote => {
                    source.push_back(continuation);
                    None
                }
                RecordScan::Malformed => None,
            };
            match cells {
                Some(cells) => {
                    for (buffer, cell) in buffers.iter_mut().zip(cells) {
                        buffer.push(cell);
                    }
                }
                None => {
                    stats.rows_dropped += 1;
                    debug!("Dropping malformed record at line {}", line_no);
                }
            }
        }

        if stats.rows_dropped > 0 {
            warn!(
                "Dropped {} of {} rows as malformed",
                stats.rows_dropped, stats.rows_read
            );
        }

        let columns: Vec<Column> = buffers
            .into_iter()
            .zip(&self.schema.columns)
            .map(|(buffer, spec)| buffer.into_column(&spec.name))
            .collect();
        let frame = DataFrame::new(columns).context("Assembling parsed table")?;
        let table = Table::new(self.schema.clone(), frame)?;
        Ok((table, stats))
    }

    fn parse_fields(
        &self,
        fields: &[String],
        expected_fields: usize,
        positions: &[(usize, SemanticType)],
    ) -> Option<Vec<Cell>> {
        if fields.len() != expected_fields {
            return None;
        }
        positions
            .iter()
            .map(|&(index, semantic_type)| parse_cell(&fields[index], semantic_type))
            .collect()
    }
}

/// Physical lines, numbered from 1, that can be pushed back when an open
/// quote turns out never to close.
struct LineSource<I> {
    lines: I,
    pending: VecDeque<(usize, Option<String>)>,
    line_no: usize,
}

impl<I> LineSource<I>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
{
    fn new(lines: I) -> Self {
        Self {
            lines,
            pending: VecDeque::new(),
            line_no: 0,
        }
    }

    /// Next line and its number; `None` in the line slot means invalid UTF-8.
    fn next(&mut self) -> Result<Option<(usize, Option<String>)>> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }
        match self.lines.next() {
            Some(bytes) => {
                self.line_no += 1;
                Ok(Some((self.line_no, decode_line(bytes?))))
            }
            None => Ok(None),
        }
    }

    fn push_back(&mut self, lines: Vec<(usize, Option<String>)>) {
        for line in lines.into_iter().rev() {
            self.pending.push_front(line);
        }
    }
}

fn decode_line(mut bytes: Vec<u8>) -> Option<String> {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSpec;
    use std::io::Cursor;

    fn small_schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSpec::new("ID", SemanticType::Identifier),
            ColumnSpec::new("Date", SemanticType::Date),
            ColumnSpec::new("Goals", SemanticType::Numeric),
            ColumnSpec::new("Weather", SemanticType::Categorical),
        ])
    }

    fn read(text: &str) -> Result<(Table, ReadStats)> {
        TolerantReader::new(small_schema()).read(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_read_well_formed() {
        let (table, stats) = read("ID,Date,Goals,Weather\n1,2023-01-01,2,Sunny\n2,2023-01-02,,Rain\n").unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(stats, ReadStats { rows_read: 2, rows_dropped: 0 });
        assert_eq!(table.numeric_values("Goals").unwrap(), vec![Some(2.0), None]);
        assert_eq!(
            table.text_values("Weather").unwrap(),
            vec![Some("Sunny".to_string()), Some("Rain".to_string())]
        );
    }

    #[test]
    fn test_read_drops_malformed_rows_individually() {
        let text = "ID,Date,Goals,Weather\n\
                    1,2023-01-01,2,Sunny\n\
                    2,2023-01-02,2\n\
                    3,2023-01-03,two,Rain\n\
                    4,not-a-date,1,Rain\n\
                    5,2023-01-05,1,Cloudy,extra\n\
                    6,2023-01-06,3,Rain\n";
        let (table, stats) = read(text).unwrap();
        assert_eq!(stats.rows_read, 6);
        assert_eq!(stats.rows_dropped, 4);
        assert_eq!(table.height(), 2);
        assert_eq!(table.numeric_values("Goals").unwrap(), vec![Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_read_quoted_field_spanning_lines() {
        let text = "ID,Date,Goals,Weather\n\
                    1,2023-01-01,2,\"Rain\nthen sun\"\n\
                    2,2023-01-02,1,Sunny\n";
        let (table, stats) = read(text).unwrap();
        assert_eq!(stats, ReadStats { rows_read: 2, rows_dropped: 0 });
        assert_eq!(
            table.text_values("Weather").unwrap(),
            vec![Some("Rain\nthen sun".to_string()), Some("Sunny".to_string())]
        );
    }

    #[test]
    fn test_read_unclosed_quote_drops_only_its_line() {
        let text = "ID,Date,Goals,Weather\n\
                    1,2023-01-01,2,\"Rain\n\
                    2,2023-01-02,1,Sunny\n\
                    3,2023-01-03,0,Fog\n";
        let (table, stats) = read(text).unwrap();
        assert_eq!(stats, ReadStats { rows_read: 3, rows_dropped: 1 });
        assert_eq!(table.integer_values("ID").unwrap(), vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_read_reorders_and_ignores_extra_columns() {
        let text = "Weather,Stadium,Goals,Date,ID\r\nSunny,Old Trafford,1,2023-01-01,9\r\n";
        let (table, _) = read(text).unwrap();
        let names: Vec<String> = table
            .frame()
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["ID", "Date", "Goals", "Weather"]);
    }

    #[test]
    fn test_read_missing_declared_column_is_schema_failure() {
        let err = read("ID,Date,Goals\n1,2023-01-01,2\n").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_read_empty_input() {
        let err = read("").unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_INPUT");
    }

    #[test]
    fn test_table_new_rejects_wrong_dtype() {
        let frame = df![
            "ID" => [1i64],
            "Date" => ["2023-01-01"],
            "Goals" => ["two"],
            "Weather" => ["Sunny"],
        ]
        .unwrap();
        let err = Table::new(small_schema(), frame).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_TYPE_MISMATCH");
    }

    #[test]
    fn test_numeric_values_rejects_nan() {
        let frame = df![
            "ID" => [1i64, 2],
            "Date" => ["2023-01-01", "2023-01-02"],
            "Goals" => [1.0, f64::NAN],
            "Weather" => ["Sunny", "Rain"],
        ]
        .unwrap();
        let table = Table::new(small_schema(), frame).unwrap();
        let err = table.numeric_values("Goals").unwrap_err();
        assert_eq!(err.error_code(), "NON_NUMERIC_VALUE");
    }

    #[test]
    fn test_filter_rows_returns_new_table() {
        let (table, _) = read("ID,Date,Goals,Weather\n1,2023-01-01,2,Sunny\n2,2023-01-02,3,Rain\n").unwrap();
        let filtered = table.filter_rows(&[false, true]).unwrap();
        assert_eq!(filtered.height(), 1);
        assert_eq!(table.height(), 2);
    }

    #[test]
    fn test_write_csv_round_trips_through_reader() {
        let (table, _) = read("ID,Date,Goals,Weather\n1,2023-01-01,2,\"Rain, heavy\"\n").unwrap();
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let (again, stats) = read(std::str::from_utf8(&out).unwrap()).unwrap();
        assert_eq!(stats.rows_dropped, 0);
        assert_eq!(again.text_values("Weather").unwrap(), vec![Some("Rain, heavy".to_string())]);
    }

    #[test]
    fn test_write_csv_round_trips_line_breaks() {
        let (table, _) = read("ID,Date,Goals,Weather\n1,2023-01-01,2,\"Rain\nlate\"\n").unwrap();
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let (again, stats) = read(std::str::from_utf8(&out).unwrap()).unwrap();
        assert_eq!(stats.rows_dropped, 0);
        assert_eq!(again.text_values("Weather").unwrap(), vec![Some("Rain\nlate".to_string())]);
    }
}
