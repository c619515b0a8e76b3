//! Phase 1: transformation plan generation.
//!
//! One model call at the categorization temperature, parsed into a
//! [`TransformationPlan`]. The parser is tolerant about surrounding prose
//! and fences but strict about shape: a missing required key fails with a
//! [`PlanParseError`] carrying the raw text. It never guesses fields, and
//! it never retries — retries are an orchestrator concern so failure
//! attribution stays clear.

use chartflow_sdk::{log_agent_complete, log_agent_failed, log_agent_start};

use crate::client::ModelClient;
use crate::config::RunConfig;
use crate::dataset::SchemaSummary;
use crate::error::{AnalysisError, PlanParseError};
use crate::pipeline::extract::extract_json_object;
use crate::pipeline::prompts;
use crate::pipeline::types::{DerivedField, KeywordRule, TransformationPlan};

/// Run the analysis phase once.
pub async fn analyze(
    client: &dyn ModelClient,
    question: &str,
    schema: &SchemaSummary,
    config: &RunConfig,
) -> Result<TransformationPlan, AnalysisError> {
    let task_id = "analyze";
    let agent_name = "Analysis Agent";

    log_agent_start!(task_id, agent_name, "Deriving a transformation plan");

    let messages = prompts::analysis_messages(question, schema);
    let response = client
        .complete(&messages, config.categorization_temperature)
        .await
        .map_err(|err| {
            log_agent_failed!(task_id, agent_name, err);
            err
        })?;

    let plan = parse_plan(&response).map_err(|err| {
        log_agent_failed!(task_id, agent_name, err);
        err
    })?;

    log_agent_complete!(
        task_id,
        agent_name,
        format!("{} categories", plan.categories.len())
    );
    Ok(plan)
}

/// Parse raw model output into a plan. Public for tests.
pub fn parse_plan(raw: &str) -> Result<TransformationPlan, PlanParseError> {
    let json_text = extract_json_object(raw).ok_or_else(|| PlanParseError {
        message: "no JSON object in model output".to_string(),
        raw: raw.to_string(),
    })?;

    let value: serde_json::Value =
        serde_json::from_str(&json_text).map_err(|err| PlanParseError {
            message: format!("invalid JSON: {}", err),
            raw: raw.to_string(),
        })?;

    let categories = required_string_array(&value, "categories", raw)?;
    if categories.is_empty() {
        return Err(PlanParseError {
            message: "`categories` is empty".to_string(),
            raw: raw.to_string(),
        });
    }

    let fields_value = value.get("derived_fields").ok_or_else(|| PlanParseError {
        message: "missing required key `derived_fields`".to_string(),
        raw: raw.to_string(),
    })?;
    let fields_array = fields_value.as_array().ok_or_else(|| PlanParseError {
        message: "`derived_fields` is not an array".to_string(),
        raw: raw.to_string(),
    })?;

    let mut derived_fields = Vec::with_capacity(fields_array.len());
    for field in fields_array {
        derived_fields.push(parse_derived_field(field, raw)?);
    }

    let rationale = value
        .get("rationale")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(TransformationPlan {
        categories,
        derived_fields,
        rationale,
    })
}

fn parse_derived_field(
    field: &serde_json::Value,
    raw: &str,
) -> Result<DerivedField, PlanParseError> {
    let name = required_string(field, "name", raw)?;
    let source_column = required_string(field, "source_column", raw)?;
    let rules = match field.get("rules") {
        None => Vec::new(),
        Some(rules_value) => {
            let rules_array = rules_value.as_array().ok_or_else(|| PlanParseError {
                message: format!("`rules` of derived field `{}` is not an array", name),
                raw: raw.to_string(),
            })?;
            let mut rules = Vec::with_capacity(rules_array.len());
            for rule in rules_array {
                rules.push(KeywordRule {
                    category: required_string(rule, "category", raw)?,
                    keywords: required_string_array(rule, "keywords", raw)?,
                });
            }
            rules
        }
    };
    Ok(DerivedField {
        name,
        source_column,
        rules,
    })
}

fn required_string(
    value: &serde_json::Value,
    key: &str,
    raw: &str,
) -> Result<String, PlanParseError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| PlanParseError {
            message: format!("missing required key `{}`", key),
            raw: raw.to_string(),
        })
}

fn required_string_array(
    value: &serde_json::Value,
    key: &str,
    raw: &str,
) -> Result<Vec<String>, PlanParseError> {
    let array = value
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| PlanParseError {
            message: format!("missing required key `{}`", key),
            raw: raw.to_string(),
        })?;
    array
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| PlanParseError {
                message: format!("`{}` contains a non-string entry", key),
                raw: raw.to_string(),
            })
        })
        .collect()
}
