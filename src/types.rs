//! Core type definitions for chart specification assembly

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Nested key/value chart definition (marks, encodings, styling, data slot)
pub type SpecTree = Map<String, Value>;

/// One dataset row: column name -> scalar
pub type Record = Map<String, Value>;

/// Closed set of chart kinds the registry knows about
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Arc,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Line, ChartKind::Bar, ChartKind::Arc];

    /// Normalize a chart-type key. `pie` is accepted as an alias of `arc`.
    pub fn from_key(key: &str) -> Result<Self, PipelineError> {
        match key.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "bar" => Ok(Self::Bar),
            "arc" | "pie" => Ok(Self::Arc),
            "" => Err(PipelineError::UnrecognizedChartType(
                "empty chart type".to_string(),
            )),
            other => Err(PipelineError::UnrecognizedChartType(other.to_string())),
        }
    }

    /// Derive the kind from a spec's mark, either `"bar"` or `{"type": "bar", ...}`
    pub fn from_spec(spec: &SpecTree) -> Result<Self, PipelineError> {
        let key = mark_type(spec).ok_or_else(|| {
            PipelineError::UnrecognizedChartType("missing mark declaration".to_string())
        })?;
        Self::from_key(key)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Arc => "arc",
        }
    }

    /// Encoding channels that must carry a data binding
    pub fn required_channels(&self) -> &'static [&'static str] {
        match self {
            Self::Line | Self::Bar => &["x", "y"],
            Self::Arc => &["theta", "color"],
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mark type string of a spec, if declared
pub fn mark_type(spec: &SpecTree) -> Option<&str> {
    match spec.get("mark")? {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("type").and_then(Value::as_str),
        _ => None,
    }
}

/// Tabular payload owned by the caller; the pipeline only reads it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names, taken from the first record
    pub fn columns(&self) -> Vec<String> {
        self.records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// True when every record carries `column`
    pub fn has_column(&self, column: &str) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.contains_key(column))
    }

    pub fn sample(&self, rows: usize) -> &[Record] {
        &self.records[..rows.min(self.records.len())]
    }
}

/// Dataset metadata handed to the model; not interpreted by the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sample: Vec<Record>,
}

impl DatasetSummary {
    pub fn from_dataset(dataset: &Dataset, sample_rows: usize) -> Self {
        Self {
            columns: dataset.columns(),
            row_count: dataset.len(),
            sample: dataset.sample(sample_rows).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Append-only conversation history, owned by one conversation
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::Assistant, content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Unique id of a fragment within one artifact (also its DOM target id)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

impl FragmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the pipeline reports after a fragment lands in the artifact
#[derive(Debug, Clone, Serialize)]
pub struct FragmentReceipt {
    pub fragment_id: FragmentId,
    pub chart_kind: ChartKind,
    /// Merged spec as it was before binding (no data rows)
    pub spec: SpecTree,
    pub rows_bound: usize,
    pub artifact: PathBuf,
}
