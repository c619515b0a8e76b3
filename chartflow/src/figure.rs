//! Renderable chart description returned by a successful run.
//!
//! The figure is a plain data structure the external UI turns into an
//! actual plot. Generated code builds it inside the sandbox via the `chart`
//! constructors; the pipeline only inspects and serializes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The enumerated set of chart kinds the pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Pie,
        ChartType::Scatter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "pie" => Ok(ChartType::Pie),
            "scatter" => Ok(ChartType::Scatter),
            _ => Err(()),
        }
    }
}

/// One plotted series. For pie charts `x` holds slice labels and `y` the
/// slice values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Trace {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub x: Vec<serde_json::Value>,
    #[serde(default)]
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FigureSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default)]
    pub traces: Vec<Trace>,
}

impl FigureSpec {
    /// True when at least one trace carries at least one point.
    pub fn has_points(&self) -> bool {
        self.traces.iter().any(|t| !t.y.is_empty() || !t.x.is_empty())
    }

    pub fn point_count(&self) -> usize {
        self.traces.iter().map(|t| t.y.len().max(t.x.len())).sum()
    }
}
