//! Exploration report and distribution artifacts.
//!
//! Profiles the raw dataset: per-column null counts, descriptive statistics,
//! name-based type hints and, for every column that contains missing values,
//! a distribution (JSON bin table plus an SVG plot). The report file is the
//! task's target and is written last, so its presence implies the
//! distribution artifacts exist.

use crate::cleaning::imputation::first_mode;
use crate::cleaning::statistics::{NumericSummary, present};
use crate::error::{PipelineError, Result, ResultExt};
use crate::scheduler::{FileTarget, TaskAction};
use crate::table::{ReadStats, Table, TolerantReader};
use crate::types::{SemanticType, TableSchema};
use plotters::coord::Shift;
use plotters::prelude::{
    BLUE, ChartBuilder, Color, DrawingArea, IntoDrawingArea, IntoSegmentedCoord, Rectangle,
    SVGBackend, SegmentValue, WHITE,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Number of equal-width bins in a numeric histogram.
pub const HISTOGRAM_BINS: usize = 30;

/// Canvas size of a distribution plot, in pixels.
const PLOT_SIZE: (u32, u32) = (960, 540);

type Canvas<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Descriptive statistics of a non-numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub count: usize,
    pub unique: usize,
    pub top: Option<String>,
    pub freq: usize,
}

impl CategorySummary {
    pub fn from_values(values: &[Option<String>]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values.iter().flatten() {
            *counts.entry(value.as_str()).or_default() += 1;
        }
        let top = first_mode(values);
        let freq = top
            .as_deref()
            .and_then(|t| counts.get(t).copied())
            .unwrap_or(0);
        Self {
            count: values.iter().flatten().count(),
            unique: counts.len(),
            top,
            freq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSummary {
    Numeric(NumericSummary),
    Category(CategorySummary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub semantic_type: SemanticType,
    pub null_count: usize,
    pub summary: ColumnSummary,
}

/// Profile of a whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub rows: usize,
    pub rows_dropped: usize,
    pub columns: Vec<ColumnProfile>,
}

impl DatasetProfile {
    pub fn from_table(table: &Table, stats: ReadStats) -> Result<Self> {
        let columns = table
            .schema()
            .columns
            .iter()
            .map(|spec| {
                let values = ColumnValues::read(table, &spec.name, spec.semantic_type)?;
                Ok(ColumnProfile {
                    name: spec.name.clone(),
                    semantic_type: spec.semantic_type,
                    null_count: values.null_count(),
                    summary: values.summary(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rows: table.height(),
            rows_dropped: stats.rows_dropped,
            columns,
        })
    }

    pub fn columns_with_missing(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.null_count > 0)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Render the plain-text exploration report.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DatasetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .columns
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0);

        writeln!(f, "Dataset Info:")?;
        writeln!(f, "Rows: {}", self.rows)?;
        writeln!(f, "Columns: {}", self.columns.len())?;
        writeln!(f, "Malformed rows dropped: {}", self.rows_dropped)?;
        for column in &self.columns {
            writeln!(
                f,
                "  {:<width$}  {:<11}  {} non-null",
                column.name,
                column.semantic_type.as_str(),
                self.rows - column.null_count,
                width = name_width
            )?;
        }

        writeln!(f, "\nSummary Statistics:")?;
        for column in &self.columns {
            let line = match &column.summary {
                ColumnSummary::Numeric(s) => format!(
                    "count={} mean={} std={} min={} 25%={} 50%={} 75%={} max={}",
                    s.count,
                    number(s.mean),
                    number(s.std),
                    number(s.min),
                    number(s.q25),
                    number(s.median),
                    number(s.q75),
                    number(s.max)
                ),
                ColumnSummary::Category(s) => format!(
                    "count={} unique={} top={} freq={}",
                    s.count,
                    s.unique,
                    s.top.as_deref().unwrap_or("NaN"),
                    s.freq
                ),
            };
            writeln!(f, "  {:<width$}  {}", column.name, line, width = name_width)?;
        }

        writeln!(f, "\nMissing Values Count:")?;
        for column in &self.columns {
            writeln!(
                f,
                "  {:<width$}  {}",
                column.name,
                column.null_count,
                width = name_width
            )?;
        }

        writeln!(
            f,
            "\nColumns with Missing Values: [{}]",
            self.columns_with_missing().join(", ")
        )?;
        for hint in name_hints(self.columns.iter().map(|c| c.name.as_str())) {
            writeln!(f, "{}", hint)?;
        }
        Ok(())
    }
}

/// Type hints derived from column names alone.
///
/// A name containing "Date" should be temporal; otherwise a name containing
/// "ID" should be integer.
pub fn name_hints<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .filter_map(|name| {
            if name.contains("Date") {
                Some(format!("{} should be converted to datetime.", name))
            } else if name.contains("ID") {
                Some(format!("{} should be converted to integer.", name))
            } else {
                None
            }
        })
        .collect()
}

fn number(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "NaN".to_string(),
    }
}

/// Column values in the shape the profile needs.
enum ColumnValues {
    Numbers(Vec<Option<f64>>),
    Labels(Vec<Option<String>>),
}

impl ColumnValues {
    fn read(table: &Table, name: &str, semantic_type: SemanticType) -> Result<Self> {
        Ok(match semantic_type {
            SemanticType::Numeric => Self::Numbers(table.numeric_values(name)?),
            SemanticType::Identifier => Self::Labels(
                table
                    .integer_values(name)?
                    .into_iter()
                    .map(|v| v.map(|id| id.to_string()))
                    .collect(),
            ),
            SemanticType::Categorical | SemanticType::Date => {
                Self::Labels(table.text_values(name)?)
            }
        })
    }

    fn null_count(&self) -> usize {
        match self {
            Self::Numbers(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Labels(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    fn summary(&self) -> ColumnSummary {
        match self {
            Self::Numbers(v) => ColumnSummary::Numeric(NumericSummary::from_values(&present(v))),
            Self::Labels(v) => ColumnSummary::Category(CategorySummary::from_values(v)),
        }
    }

    fn distribution(&self, column: &str) -> Distribution {
        match self {
            Self::Numbers(v) => Distribution::numeric(column, v),
            Self::Labels(v) => Distribution::categorical(column, v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Distribution artifact for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Histogram {
        column: String,
        missing: usize,
        bins: Vec<HistogramBin>,
    },
    Counts {
        column: String,
        missing: usize,
        values: Vec<ValueCount>,
    },
}

impl Distribution {
    /// Equal-width histogram over `[min, max]`. The last bin is closed.
    pub fn numeric(column: &str, values: &[Option<f64>]) -> Self {
        let present = present(values);
        let missing = values.len() - present.len();
        let mut bins = Vec::new();

        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !present.is_empty() {
            let width = (max - min) / HISTOGRAM_BINS as f64;
            if width == 0.0 {
                bins.push(HistogramBin {
                    lower: min,
                    upper: max,
                    count: present.len(),
                });
            } else {
                bins = (0..HISTOGRAM_BINS)
                    .map(|i| HistogramBin {
                        lower: min + width * i as f64,
                        upper: if i + 1 == HISTOGRAM_BINS {
                            max
                        } else {
                            min + width * (i + 1) as f64
                        },
                        count: 0,
                    })
                    .collect();
                for v in &present {
                    let index = (((v - min) / width) as usize).min(HISTOGRAM_BINS - 1);
                    bins[index].count += 1;
                }
            }
        }

        Self::Histogram {
            column: column.to_string(),
            missing,
            bins,
        }
    }

    /// Value counts, most frequent first, ties in order of first appearance.
    pub fn categorical(column: &str, values: &[Option<String>]) -> Self {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut seen = HashSet::new();
        for value in values.iter().flatten() {
            if seen.insert(value.as_str()) {
                order.push(value.as_str());
            }
            *counts.entry(value.as_str()).or_default() += 1;
        }

        let mut values_out: Vec<ValueCount> = order
            .into_iter()
            .map(|v| ValueCount {
                value: v.to_string(),
                count: counts[v],
            })
            .collect();
        values_out.sort_by(|a, b| b.count.cmp(&a.count));

        Self::Counts {
            column: column.to_string(),
            missing: values.iter().filter(|v| v.is_none()).count(),
            values: values_out,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Histogram { column, .. } | Self::Counts { column, .. } => column,
        }
    }

    /// Draw the distribution as an SVG bar chart.
    pub fn to_svg(&self) -> Result<String> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, PLOT_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;
            match self {
                Self::Histogram { column, bins, .. } => draw_histogram(&root, column, bins)?,
                Self::Counts { column, values, .. } => draw_counts(&root, column, values)?,
            }
            root.present().map_err(render_error)?;
        }
        Ok(svg)
    }
}

fn render_error(e: impl fmt::Display) -> PipelineError {
    PipelineError::Render(e.to_string())
}

fn draw_histogram(root: &Canvas<'_>, column: &str, bins: &[HistogramBin]) -> Result<()> {
    let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
        return Ok(());
    };
    let (mut lower, mut upper) = (first.lower, last.upper);
    if upper <= lower {
        lower -= 0.5;
        upper += 0.5;
    }
    let peak = bins.iter().map(|b| b.count).max().unwrap_or(0) + 1;

    let mut chart = ChartBuilder::on(root)
        .caption(format!("Distribution of {}", column), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lower..upper, 0usize..peak)
        .map_err(render_error)?;
    chart
        .configure_mesh()
        .x_desc(column)
        .y_desc("Frequency")
        .draw()
        .map_err(render_error)?;
    chart
        .draw_series(bins.iter().map(|bin| {
            let (x0, x1) = if bin.upper > bin.lower {
                (bin.lower, bin.upper)
            } else {
                (lower, upper)
            };
            Rectangle::new([(x0, 0), (x1, bin.count)], BLUE.mix(0.6).filled())
        }))
        .map_err(render_error)?;
    Ok(())
}

fn draw_counts(root: &Canvas<'_>, column: &str, values: &[ValueCount]) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let peak = values.iter().map(|v| v.count).max().unwrap_or(0) + 1;

    let mut chart = ChartBuilder::on(root)
        .caption(format!("Distribution of {}", column), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0..values.len()).into_segmented(), 0usize..peak)
        .map_err(render_error)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(values.len())
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => values
                .get(*i)
                .map(|v| v.value.clone())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc(column)
        .y_desc("Count")
        .draw()
        .map_err(render_error)?;
    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            Rectangle::new(
                [(SegmentValue::Exact(i), 0), (SegmentValue::Exact(i + 1), v.count)],
                BLUE.mix(0.6).filled(),
            )
        }))
        .map_err(render_error)?;
    Ok(())
}

/// Writes the exploration report for the raw dataset.
pub struct ExploreTask {
    schema: TableSchema,
    input: PathBuf,
    artifact_dir: PathBuf,
    report: FileTarget,
}

impl ExploreTask {
    pub fn new(
        schema: TableSchema,
        input: impl Into<PathBuf>,
        artifact_dir: impl Into<PathBuf>,
        report: FileTarget,
    ) -> Self {
        Self {
            schema,
            input: input.into(),
            artifact_dir: artifact_dir.into(),
            report,
        }
    }

    /// Path of the distribution artifact for `column`.
    pub fn distribution_path(&self, column: &str) -> PathBuf {
        distribution_path(&self.artifact_dir, column)
    }

    /// Path of the distribution plot for `column`.
    pub fn plot_path(&self, column: &str) -> PathBuf {
        plot_path(&self.artifact_dir, column)
    }

    pub fn explore(&self) -> Result<DatasetProfile> {
        let (table, stats) = TolerantReader::new(self.schema.clone()).read_path(&self.input)?;
        let profile = DatasetProfile::from_table(&table, stats)?;

        for column in profile.columns_with_missing() {
            let semantic_type = table.semantic_type(column)?;
            let distribution = ColumnValues::read(&table, column, semantic_type)?.distribution(column);
            let data_path = self.distribution_path(column);
            FileTarget::new(&data_path)
                .write_all(&serde_json::to_vec_pretty(&distribution)?)
                .context(format!("Writing distribution of '{}'", column))?;
            let plot = self.plot_path(column);
            FileTarget::new(&plot)
                .write_all(distribution.to_svg()?.as_bytes())
                .context(format!("Writing distribution plot of '{}'", column))?;
            debug!("Wrote {} and {}", data_path.display(), plot.display());
        }

        self.report.write_all(profile.render().as_bytes())?;
        info!(
            "Exploration report written to {} ({} columns with missing values)",
            self.report.path().display(),
            profile.columns_with_missing().len()
        );
        Ok(profile)
    }
}

impl TaskAction for ExploreTask {
    fn run(&self) -> Result<()> {
        self.explore().map(|_| ())
    }
}

pub fn distribution_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{}_distribution.json", column))
}

pub fn plot_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{}_distribution.svg", column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSpec;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_name_hints() {
        let hints = name_hints(["Match_ID", "Date", "Goals", "Update_Date_ID"]);
        assert_eq!(
            hints,
            vec![
                "Match_ID should be converted to integer.",
                "Date should be converted to datetime.",
                "Update_Date_ID should be converted to datetime.",
            ]
        );
    }

    #[test]
    fn test_category_summary() {
        let values: Vec<Option<String>> = ["Rain", "Sunny", "Sunny", "Rain", "Snow"]
            .iter()
            .map(|s| Some(s.to_string()))
            .chain([None])
            .collect();
        let summary = CategorySummary::from_values(&values);
        assert_eq!(summary.count, 5);
        assert_eq!(summary.unique, 3);
        // Sunny reaches two occurrences before Rain does
        assert_eq!(summary.top.as_deref(), Some("Sunny"));
        assert_eq!(summary.freq, 2);
    }

    #[test]
    fn test_numeric_histogram_covers_every_value() {
        let values: Vec<Option<f64>> = (0..=60).map(|v| Some(v as f64)).chain([None, None]).collect();
        let Distribution::Histogram { missing, bins, .. } = Distribution::numeric("Goals", &values) else {
            panic!("expected a histogram");
        };
        assert_eq!(missing, 2);
        assert_eq!(bins.len(), HISTOGRAM_BINS);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 61);
        assert_eq!(bins[HISTOGRAM_BINS - 1].upper, 60.0);
    }

    #[test]
    fn test_numeric_histogram_constant_column() {
        let Distribution::Histogram { bins, .. } = Distribution::numeric("x", &[Some(3.0), Some(3.0)]) else {
            panic!("expected a histogram");
        };
        assert_eq!(bins, vec![HistogramBin { lower: 3.0, upper: 3.0, count: 2 }]);
    }

    #[test]
    fn test_constant_column_still_plots() {
        let distribution = Distribution::numeric("Goals", &[Some(2.0), Some(2.0), None]);
        let svg = distribution.to_svg().unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<rect"));
        assert_eq!(distribution.column(), "Goals");
    }

    #[test]
    fn test_explore_writes_report_and_distributions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.csv");
        fs::write(
            &input,
            "Match_ID,Date,Attendance,Weather\n\
             1,2023-01-01,100,Sunny\n\
             2,2023-01-02,,Rain\n\
             3,2023-01-03,120,\n\
             4,2023-01-04,130,Sunny\n",
        )
        .unwrap();
        let schema = TableSchema::new(vec![
            ColumnSpec::new("Match_ID", SemanticType::Identifier),
            ColumnSpec::new("Date", SemanticType::Date),
            ColumnSpec::new("Attendance", SemanticType::Numeric),
            ColumnSpec::new("Weather", SemanticType::Categorical),
        ]);
        let report = FileTarget::new(dir.path().join("exploration_report.txt"));
        let task = ExploreTask::new(schema, &input, dir.path(), report.clone());

        let profile = task.explore().unwrap();

        assert_eq!(profile.rows, 4);
        assert_eq!(profile.columns_with_missing(), vec!["Attendance", "Weather"]);
        assert!(task.distribution_path("Attendance").exists());
        assert!(task.distribution_path("Weather").exists());
        assert!(!task.distribution_path("Date").exists());
        for column in ["Attendance", "Weather"] {
            let svg = fs::read_to_string(task.plot_path(column)).unwrap();
            assert!(svg.contains("<svg"));
            assert!(svg.contains(&format!("Distribution of {}", column)));
        }
        assert!(!task.plot_path("Date").exists());

        let text = fs::read_to_string(report.path()).unwrap();
        assert!(text.starts_with("Dataset Info:\nRows: 4\n"));
        assert!(text.contains("Columns with Missing Values: [Attendance, Weather]"));
        assert!(text.contains("Match_ID should be converted to integer."));
        assert!(text.contains("Date should be converted to datetime."));
        assert!(text.contains("top=Sunny freq=2"));

        let weather: Distribution =
            serde_json::from_str(&fs::read_to_string(task.distribution_path("Weather")).unwrap()).unwrap();
        assert_eq!(
            weather,
            Distribution::Counts {
                column: "Weather".to_string(),
                missing: 1,
                values: vec![
                    ValueCount { value: "Sunny".to_string(), count: 2 },
                    ValueCount { value: "Rain".to_string(), count: 1 },
                ],
            }
        );
    }
}
