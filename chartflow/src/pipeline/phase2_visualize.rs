//! Phase 2: visualization code generation.
//!
//! One model call at the visualization temperature (default 0.0 for strict
//! adherence). The raw completion is stripped of code-fence markup and
//! becomes a [`GeneratedCode`]; an empty result is a [`CodeParseError`].
//! Prior failed attempts ride along in the prompt so the model can correct
//! itself.

use chartflow_sdk::{log_agent_complete, log_agent_failed, log_agent_message, log_agent_start};

use crate::client::ModelClient;
use crate::config::RunConfig;
use crate::dataset::SchemaSummary;
use crate::error::{CodeParseError, VisualizationError};
use crate::pipeline::extract::extract_code_block;
use crate::pipeline::prompts;
use crate::pipeline::types::{Attempt, GeneratedCode, TransformationPlan};

/// Run one visualization-phase generation.
pub async fn generate(
    client: &dyn ModelClient,
    question: &str,
    schema: &SchemaSummary,
    plan: &TransformationPlan,
    prior: &[Attempt],
    config: &RunConfig,
) -> Result<GeneratedCode, VisualizationError> {
    let task_id = "visualize";
    let agent_name = "Visualization Agent";
    let attempt = prior.len() as u32;

    log_agent_start!(
        task_id,
        agent_name,
        format!("Generating visualization code (attempt {})", attempt + 1)
    );

    let messages = prompts::visualization_messages(question, schema, plan, prior);
    let response = client
        .complete(&messages, config.visualization_temperature)
        .await
        .map_err(|err| {
            log_agent_failed!(task_id, agent_name, err);
            err
        })?;

    let code = parse_code(&response, attempt).map_err(|err| {
        log_agent_failed!(task_id, agent_name, err);
        err
    })?;

    log_agent_message!(task_id, agent_name, code.source);
    log_agent_complete!(
        task_id,
        agent_name,
        format!("{} lines of code", code.source.lines().count())
    );
    Ok(code)
}

/// Strip fence markup from raw model output. Public for tests.
pub fn parse_code(raw: &str, attempt: u32) -> Result<GeneratedCode, CodeParseError> {
    let source = extract_code_block(raw);
    if source.is_empty() {
        return Err(CodeParseError {
            raw: raw.to_string(),
        });
    }
    Ok(GeneratedCode { source, attempt })
}
