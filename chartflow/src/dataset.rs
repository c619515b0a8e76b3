//! In-memory tabular dataset and its derived schema summary.
//!
//! The dataset is caller-owned, read-only input for one pipeline run. The
//! sandbox only ever sees a converted copy, so generated code cannot mutate
//! it (see [`Dataset::fingerprint`] for how tests pin this down). The schema
//! summary is the bounded view of the data that grounds both prompts:
//! column names and kinds, categorical sample values, date ranges and a
//! capped row sample — never the full contents.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Hard ceiling on rows embedded into a prompt, regardless of configuration.
pub const MAX_SAMPLE_ROWS: usize = 20;

/// Distinct-value threshold below which a text column counts as categorical.
const CATEGORICAL_MAX_DISTINCT: usize = 25;

/// How many distinct values of a categorical column the summary keeps.
const MAX_CATEGORY_SAMPLES: usize = 8;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset has no rows")]
    Empty,
}

/// A single cell. Dates are calendar dates; timestamps are truncated to
/// their date on ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    /// Parse a raw CSV field into the most specific value it supports.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed {
            "true" | "TRUE" | "True" => return CellValue::Bool(true),
            "false" | "FALSE" | "False" => return CellValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
        if let Some(date) = parse_date(trimmed) {
            return CellValue::Date(date);
        }
        CellValue::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// JSON rendering used when handing rows to the sandbox. Dates become
    /// ISO strings so period grouping can work on string prefixes.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Timestamp forms first so the date part survives truncation
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    None
}

/// Named columns, ordered rows. Row width always matches `columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Load a dataset from a CSV file with light type inference per cell.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<CellValue> = record.iter().map(CellValue::parse).collect();
            // Ragged rows are padded rather than rejected
            row.resize(columns.len(), CellValue::Null);
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { columns, rows })
    }

    /// Rows as JSON records, the shape handed to the sandbox. Null cells
    /// are omitted so they read back as plain `nil` on the Lua side.
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .filter(|(_, cell)| !cell.is_null())
                    .map(|(name, cell)| (name.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }

    /// Stable content hash. Used to verify that sandboxed code cannot reach
    /// back into the caller's data.
    pub fn fingerprint(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.columns.hash(&mut hasher);
        for row in &self.rows {
            for cell in row {
                match cell {
                    CellValue::Null => 0u8.hash(&mut hasher),
                    CellValue::Bool(b) => {
                        1u8.hash(&mut hasher);
                        b.hash(&mut hasher);
                    }
                    CellValue::Number(n) => {
                        2u8.hash(&mut hasher);
                        n.to_bits().hash(&mut hasher);
                    }
                    CellValue::Date(d) => {
                        3u8.hash(&mut hasher);
                        d.hash(&mut hasher);
                    }
                    CellValue::Text(s) => {
                        4u8.hash(&mut hasher);
                        s.hash(&mut hasher);
                    }
                }
            }
        }
        hasher.finish()
    }
}

/// Inferred column kind, by majority of non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Number,
    Date,
    Categorical,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Number => "number",
            ColumnKind::Date => "date",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub distinct_values: usize,
    /// Bounded distinct values in first-occurrence order; categorical only.
    pub sample_values: Vec<String>,
    /// Min/max for date columns.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// Derived, immutable view of a [`Dataset`] used to ground prompts.
/// Computed once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub row_count: usize,
    pub columns: Vec<ColumnSummary>,
    /// First `min(sample_rows, MAX_SAMPLE_ROWS)` rows, rendered as strings.
    pub sample: Vec<Vec<String>>,
}

impl SchemaSummary {
    pub fn of(dataset: &Dataset, sample_rows: usize) -> Self {
        let columns = dataset
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| summarize_column(dataset, idx, name))
            .collect();

        let take = sample_rows.min(MAX_SAMPLE_ROWS).min(dataset.rows.len());
        let sample = dataset.rows[..take]
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        Self {
            row_count: dataset.row_count(),
            columns,
            sample,
        }
    }

    /// The column most likely to carry free text worth categorizing: the
    /// text column with the most distinct values. Falls back to the first
    /// categorical column when no true text column exists.
    pub fn primary_text_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Text)
            .max_by_key(|c| c.distinct_values)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|c| c.kind == ColumnKind::Categorical)
            })
            .map(|c| c.name.as_str())
    }
}

fn summarize_column(dataset: &Dataset, idx: usize, name: &str) -> ColumnSummary {
    let mut numbers = 0usize;
    let mut dates = 0usize;
    let mut bools = 0usize;
    let mut non_null = 0usize;
    // Exact distinct count via set; ordered vec keeps first-occurrence samples
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut ordered: Vec<String> = Vec::new();
    let mut min_date: Option<NaiveDate> = None;
    let mut max_date: Option<NaiveDate> = None;

    for row in &dataset.rows {
        let cell = &row[idx];
        if cell.is_null() {
            continue;
        }
        non_null += 1;
        match cell {
            CellValue::Number(_) => numbers += 1,
            CellValue::Bool(_) => bools += 1,
            CellValue::Date(d) => {
                dates += 1;
                min_date = Some(min_date.map_or(*d, |m| m.min(*d)));
                max_date = Some(max_date.map_or(*d, |m| m.max(*d)));
            }
            CellValue::Text(_) | CellValue::Null => {}
        }
        let rendered = cell.to_string();
        if seen.insert(rendered.clone()) && ordered.len() < MAX_CATEGORY_SAMPLES {
            ordered.push(rendered);
        }
    }

    let distinct_values = seen.len();
    let kind = if non_null == 0 {
        ColumnKind::Text
    } else if dates * 2 > non_null {
        ColumnKind::Date
    } else if numbers * 2 > non_null {
        ColumnKind::Number
    } else if bools * 2 > non_null
        || (distinct_values <= CATEGORICAL_MAX_DISTINCT && distinct_values < non_null)
    {
        ColumnKind::Categorical
    } else {
        ColumnKind::Text
    };

    let sample_values = if kind == ColumnKind::Categorical {
        ordered
    } else {
        Vec::new()
    };

    ColumnSummary {
        name: name.to_string(),
        kind,
        distinct_values,
        sample_values,
        date_range: if kind == ColumnKind::Date {
            min_date.zip(max_date)
        } else {
            None
        },
    }
}
