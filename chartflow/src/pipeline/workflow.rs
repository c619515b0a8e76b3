//! Pipeline orchestration.
//!
//! Drives the phase sequence as an explicit state machine:
//!
//! `Init -> Analyzing -> Visualizing -> Executing -> Verifying ->
//! {Done | Retrying -> Visualizing | Failed}`
//!
//! The orchestrator owns the retry loop and the attempt history. Analysis
//! runs at most once per invocation; without a plan there is nothing
//! coherent to visualize, so an analysis failure is terminal. Every failed
//! attempt (parse, execution, timeout or verification) lands in the history
//! and its diagnostics ride into the next visualization prompt. The retry
//! count never exceeds the configured bound; exhausting it terminates the
//! run as `Failed` with everything tried.

use std::str::FromStr;

use chartflow_sdk::{
    log_info, log_phase_complete, log_phase_failed, log_phase_start, log_task_complete,
    log_task_failed, log_task_start,
};
use chrono::{DateTime, Utc};

use crate::client::ModelClient;
use crate::config::RunConfig;
use crate::dataset::{Dataset, SchemaSummary};
use crate::error::VisualizationError;
use crate::figure::ChartType;
use crate::pipeline::types::{
    Attempt, ExecutionResult, GeneratedCode, PhaseTag, PipelineRun, RunFailure, RunOutcome,
    RunSuccess, VerificationVerdict,
};
use crate::pipeline::{phase1_analyze, phase2_visualize, verify};
use crate::sandbox::{self, SandboxOptions};

pub const TOTAL_PHASES: usize = 4;

/// Orchestrator state. Attempt data travels inside the states so a phase
/// can only consume what its predecessor actually produced.
enum Phase {
    Visualizing,
    Executing(GeneratedCode, DateTime<Utc>),
    Verifying(GeneratedCode, ExecutionResult, DateTime<Utc>),
    Retrying(Attempt),
    Done(Attempt),
    Failed(PhaseTag, String),
}

/// Run the whole pipeline once for a (question, dataset) pair.
pub async fn run_pipeline(
    client: &dyn ModelClient,
    question: &str,
    dataset: &Dataset,
    config: &RunConfig,
) -> RunOutcome {
    let schema = SchemaSummary::of(dataset, config.sample_rows);
    let mut run = PipelineRun::new(question);

    log_phase_start!(1, "Analyze", TOTAL_PHASES);
    let plan = match phase1_analyze::analyze(client, question, &schema, config).await {
        Ok(plan) => {
            log_phase_complete!(1, "Analyze");
            plan
        }
        Err(err) => {
            log_phase_failed!(1, "Analyze", err);
            return RunOutcome::Failed(RunFailure {
                phase: PhaseTag::Analyzing,
                reason: err.to_string(),
                run,
            });
        }
    };
    run.plan = Some(plan.clone());

    let mut state = Phase::Visualizing;
    loop {
        state = match state {
            Phase::Visualizing => {
                log_phase_start!(2, "Visualize", TOTAL_PHASES);
                let started_at = Utc::now();
                match phase2_visualize::generate(
                    client,
                    question,
                    &schema,
                    &plan,
                    &run.history,
                    config,
                )
                .await
                {
                    Ok(code) => {
                        log_phase_complete!(2, "Visualize");
                        Phase::Executing(code, started_at)
                    }
                    Err(VisualizationError::Parse(err)) => {
                        log_phase_failed!(2, "Visualize", err);
                        // Unusable output still becomes an attempt so its
                        // diagnostic reaches the next prompt.
                        let reason = err.to_string();
                        Phase::Retrying(Attempt {
                            code: GeneratedCode {
                                source: err.raw,
                                attempt: run.history.len() as u32,
                            },
                            execution: ExecutionResult::Failure {
                                error: reason.clone(),
                                stack_summary: String::new(),
                                timed_out: false,
                                output: Vec::new(),
                            },
                            verdict: VerificationVerdict::Fail {
                                reasons: vec![reason],
                            },
                            started_at,
                        })
                    }
                    Err(VisualizationError::Client(err)) => {
                        log_phase_failed!(2, "Visualize", err);
                        Phase::Failed(PhaseTag::Visualizing, err.to_string())
                    }
                }
            }

            Phase::Executing(code, started_at) => {
                log_phase_start!(3, "Execute", TOTAL_PHASES);
                log_task_start!(3, "execute", "Running generated code in the sandbox");
                let execution = sandbox::execute_blocking(
                    code.source.clone(),
                    dataset.clone(),
                    SandboxOptions::with_timeout_secs(config.execution_timeout_secs),
                )
                .await;
                match &execution {
                    ExecutionResult::Success { .. } => {
                        log_task_complete!("execute");
                        log_phase_complete!(3, "Execute");
                    }
                    ExecutionResult::Failure { error, .. } => {
                        log_task_failed!("execute", error);
                        log_phase_failed!(3, "Execute", error);
                    }
                }
                Phase::Verifying(code, execution, started_at)
            }

            Phase::Verifying(code, execution, started_at) => {
                log_phase_start!(4, "Verify", TOTAL_PHASES);
                let verdict = verify::verify(&execution, &plan, &config.verify);
                let attempt = Attempt {
                    code,
                    execution,
                    verdict,
                    started_at,
                };
                if attempt.verdict.is_pass() {
                    log_phase_complete!(4, "Verify");
                    Phase::Done(attempt)
                } else {
                    log_phase_failed!(4, "Verify", attempt.verdict.reasons().join("; "));
                    Phase::Retrying(attempt)
                }
            }

            Phase::Retrying(attempt) => {
                run.history.push(attempt);
                if run.retries < config.max_retries {
                    run.retries += 1;
                    log_info!(
                        "Retrying visualization ({}/{})",
                        run.retries,
                        config.max_retries
                    );
                    Phase::Visualizing
                } else {
                    let reasons = run
                        .last_attempt()
                        .map(|a| a.verdict.reasons().join("; "))
                        .unwrap_or_default();
                    Phase::Failed(
                        PhaseTag::Verifying,
                        format!(
                            "retry limit reached after {} attempts: {}",
                            run.history.len(),
                            reasons
                        ),
                    )
                }
            }

            Phase::Done(attempt) => {
                run.history.push(attempt);
                // A Pass verdict implies a successful execution with a
                // recognized chart tag.
                let success = run.last_attempt().and_then(|a| match &a.execution {
                    ExecutionResult::Success {
                        figure,
                        chart_type,
                        plot_data,
                        ..
                    } => ChartType::from_str(chart_type).ok().map(|chart| {
                        (figure.clone(), chart, plot_data.clone())
                    }),
                    ExecutionResult::Failure { .. } => None,
                });
                return match success {
                    Some((figure, chart_type, plot_data)) => RunOutcome::Done(RunSuccess {
                        figure,
                        chart_type,
                        plot_data,
                        run,
                    }),
                    None => RunOutcome::Failed(RunFailure {
                        phase: PhaseTag::Verifying,
                        reason: "pass verdict without a successful execution".to_string(),
                        run,
                    }),
                };
            }

            Phase::Failed(phase, reason) => {
                return RunOutcome::Failed(RunFailure { phase, reason, run });
            }
        };
    }
}
