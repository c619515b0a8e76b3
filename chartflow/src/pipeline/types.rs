//! Data structures for pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::figure::{ChartType, FigureSpec};

/// Binding names the generated code must define in the sandbox.
pub const BINDING_FIG: &str = "fig";
pub const BINDING_CHART_TYPE: &str = "chart_type";
pub const BINDING_PLOT_DATA: &str = "plot_data";

/// Keyword mapping deriving one candidate category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

/// Specification of a field derived from an existing column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedField {
    pub name: String,
    pub source_column: String,
    pub rules: Vec<KeywordRule>,
}

/// Structured output of the analysis phase: how raw data should be
/// categorized before visualization. Produced once per run, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationPlan {
    pub categories: Vec<String>,
    pub derived_fields: Vec<DerivedField>,
    #[serde(default)]
    pub rationale: String,
}

impl TransformationPlan {
    /// Grouping cardinality the plan implies, used by verification.
    pub fn expected_cardinality(&self) -> usize {
        self.categories.len()
    }
}

/// Source produced by the visualization phase. A failed execution triggers
/// regeneration of a new instance, never a patch of this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub source: String,
    pub attempt: u32,
}

/// One aggregated record of the verification table.
pub type PlotRow = serde_json::Map<String, serde_json::Value>;

/// Outcome of running generated code in the sandbox. Exceptions are
/// captured into `Failure`, never propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success {
        figure: FigureSpec,
        chart_type: String,
        plot_data: Vec<PlotRow>,
        /// Captured, line-capped print() output
        output: Vec<String>,
    },
    Failure {
        error: String,
        stack_summary: String,
        timed_out: bool,
        output: Vec<String>,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }
}

/// Outcome of structural verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum VerificationVerdict {
    Pass,
    Fail { reasons: Vec<String> },
}

impl VerificationVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, VerificationVerdict::Pass)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            VerificationVerdict::Pass => &[],
            VerificationVerdict::Fail { reasons } => reasons,
        }
    }
}

/// One visualization attempt: the generated code, what executing it did,
/// and what verification decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub code: GeneratedCode,
    pub execution: ExecutionResult,
    pub verdict: VerificationVerdict,
    pub started_at: DateTime<Utc>,
}

/// The overall invocation context. Created at run start, mutated only by
/// the orchestrator, returned inside the outcome; nothing persists across
/// invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub question: String,
    pub retries: u32,
    pub plan: Option<TransformationPlan>,
    pub history: Vec<Attempt>,
}

impl PipelineRun {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            retries: 0,
            plan: None,
            history: Vec::new(),
        }
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.history.last()
    }
}

/// Phase in which a run terminally failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    Analyzing,
    Visualizing,
    Executing,
    Verifying,
}

impl std::fmt::Display for PhaseTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PhaseTag::Analyzing => "analyzing",
            PhaseTag::Visualizing => "visualizing",
            PhaseTag::Executing => "executing",
            PhaseTag::Verifying => "verifying",
        };
        f.write_str(name)
    }
}

/// Successful bundle: the verified figure plus the full attempt history
/// for audit ("show generated code").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSuccess {
    pub figure: FigureSpec,
    pub chart_type: ChartType,
    pub plot_data: Vec<PlotRow>,
    pub run: PipelineRun,
}

/// Terminal failure: the phase that gave up, why, and everything tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub phase: PhaseTag,
    pub reason: String,
    pub run: PipelineRun,
}

/// Terminal result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Done(RunSuccess),
    Failed(RunFailure),
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }
}
