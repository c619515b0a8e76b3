//! Structural verification of execution results.
//!
//! The gate is the anti-hallucination check: the figure must carry real
//! traces, the chart tag must be one we can render, and the aggregated
//! table must look like an aggregation of the data rather than a
//! passthrough or a collapsed scalar. Thresholds are policy, not code —
//! the source behavior they approximate was inferred, so they stay
//! configurable.

use std::str::FromStr;

use crate::figure::ChartType;
use crate::pipeline::types::{ExecutionResult, TransformationPlan, VerificationVerdict};

/// Tunable thresholds for the structural checks.
#[derive(Debug, Clone)]
pub struct VerifyPolicy {
    /// Largest plausible aggregated table; more rows reads as un-aggregated
    /// raw data.
    pub max_rows: usize,
    /// Reject a single-row table when the plan names more than one
    /// category.
    pub require_group_spread: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            max_rows: 500,
            require_group_spread: true,
        }
    }
}

/// Decide pass/fail for one execution result. Reasons accumulate; the
/// orchestrator feeds them all into the next prompt.
pub fn verify(
    result: &ExecutionResult,
    plan: &TransformationPlan,
    policy: &VerifyPolicy,
) -> VerificationVerdict {
    let (figure, chart_type, plot_data) = match result {
        ExecutionResult::Failure {
            error, timed_out, ..
        } => {
            let reason = if *timed_out {
                format!("execution timed out: {}", error)
            } else {
                format!("execution failed: {}", error)
            };
            return VerificationVerdict::Fail {
                reasons: vec![reason],
            };
        }
        ExecutionResult::Success {
            figure,
            chart_type,
            plot_data,
            ..
        } => (figure, chart_type, plot_data),
    };

    let mut reasons = Vec::new();

    if !figure.has_points() {
        reasons.push("figure has no traces or points".to_string());
    }

    if ChartType::from_str(chart_type).is_err() {
        reasons.push(format!(
            "unrecognized chart type tag `{}` (expected one of: {})",
            chart_type,
            ChartType::ALL
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    if plot_data.is_empty() {
        reasons.push("aggregated data table is empty".to_string());
    } else {
        let expected = plan.expected_cardinality();
        if policy.require_group_spread && expected > 1 && plot_data.len() == 1 {
            reasons.push(format!(
                "aggregated table collapsed to a single row while the plan names {} categories",
                expected
            ));
        }
        if plot_data.len() > policy.max_rows {
            reasons.push(format!(
                "aggregated table has {} rows (limit {}); the data does not look aggregated",
                plot_data.len(),
                policy.max_rows
            ));
        }
    }

    if reasons.is_empty() {
        VerificationVerdict::Pass
    } else {
        VerificationVerdict::Fail { reasons }
    }
}
