//! Tests for pipeline orchestration
//!
//! A scripted model client drives the orchestrator through its happy path,
//! retry loop, retry exhaustion and terminal analysis failure.

use super::common::*;
use chartflow::config::RunConfig;
use chartflow::figure::ChartType;
use chartflow::pipeline::{run_pipeline, PhaseTag, RunOutcome};

fn test_config() -> RunConfig {
    RunConfig {
        max_retries: 3,
        execution_timeout_secs: 10,
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn test_happy_path_counts_categories() {
    let client = MockModelClient::new(&[PLAN_RESPONSE, GOOD_CODE]);
    let dataset = category_dataset();

    match run_pipeline(&client, "most frequent category", &dataset, &test_config()).await {
        RunOutcome::Done(success) => {
            assert_eq!(success.chart_type, ChartType::Bar);
            assert_eq!(success.plot_data.len(), 3);
            let counts: Vec<i64> = success
                .plot_data
                .iter()
                .map(|row| row.get("count").and_then(|v| v.as_i64()).unwrap())
                .collect();
            assert_eq!(counts, vec![6, 3, 1]);
            assert!(success.figure.has_points());
            assert_eq!(success.run.retries, 0);
            assert_eq!(success.run.history.len(), 1);
            assert!(success.run.plan.is_some());
        }
        RunOutcome::Failed(failure) => panic!("unexpected failure: {}", failure.reason),
    }
}

#[tokio::test]
async fn test_missing_column_triggers_retry_with_feedback() {
    let client = MockModelClient::new(&[PLAN_RESPONSE, MISSING_COLUMN_CODE, GOOD_CODE]);
    let dataset = category_dataset();

    match run_pipeline(&client, "most frequent category", &dataset, &test_config()).await {
        RunOutcome::Done(success) => {
            assert_eq!(success.run.retries, 1);
            assert_eq!(success.run.history.len(), 2);
            assert!(!success.run.history[0].verdict.is_pass());
            assert!(success.run.history[1].verdict.is_pass());
        }
        RunOutcome::Failed(failure) => panic!("unexpected failure: {}", failure.reason),
    }

    // Call 0 = analysis, 1 = first generation, 2 = retry. The retry prompt
    // must carry the prior code and the error naming the missing column.
    let retry_prompt = client.call_text(2);
    assert!(retry_prompt.contains("Missing"));
    assert!(retry_prompt.contains("does not exist"));
    assert!(retry_prompt.contains("tbl.count_by(data, \"Missing\")"));
}

#[tokio::test]
async fn test_malformed_analysis_is_terminal_with_no_attempts() {
    let client = MockModelClient::new(&["I will not produce JSON today."]);
    let dataset = category_dataset();

    match run_pipeline(&client, "q", &dataset, &test_config()).await {
        RunOutcome::Failed(failure) => {
            assert_eq!(failure.phase, PhaseTag::Analyzing);
            assert!(failure.run.history.is_empty());
            assert_eq!(failure.run.retries, 0);
        }
        RunOutcome::Done(_) => panic!("analysis failure must be terminal"),
    }
    // Only the analysis call was ever made
    assert_eq!(client.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_retry_bound_is_honored() {
    let config = RunConfig {
        max_retries: 1,
        ..test_config()
    };
    let client = MockModelClient::new(&[PLAN_RESPONSE, MISSING_COLUMN_CODE, MISSING_COLUMN_CODE]);
    let dataset = category_dataset();

    match run_pipeline(&client, "q", &dataset, &config).await {
        RunOutcome::Failed(failure) => {
            assert_eq!(failure.phase, PhaseTag::Verifying);
            assert!(failure.reason.contains("retry limit"));
            assert_eq!(failure.run.retries, 1);
            assert_eq!(failure.run.history.len(), 2);
        }
        RunOutcome::Done(_) => panic!("exhausted retries must not yield Done"),
    }
}

#[tokio::test]
async fn test_unparseable_code_is_retried() {
    let client = MockModelClient::new(&[PLAN_RESPONSE, "``````", GOOD_CODE]);
    let dataset = category_dataset();

    match run_pipeline(&client, "q", &dataset, &test_config()).await {
        RunOutcome::Done(success) => {
            assert_eq!(success.run.retries, 1);
            assert_eq!(success.run.history.len(), 2);
        }
        RunOutcome::Failed(failure) => panic!("unexpected failure: {}", failure.reason),
    }
}

#[tokio::test]
async fn test_transport_error_mid_run_is_terminal_in_visualizing() {
    // Only the plan is scripted; the generation call finds the queue empty
    let client = MockModelClient::new(&[PLAN_RESPONSE]);
    let dataset = category_dataset();

    match run_pipeline(&client, "q", &dataset, &test_config()).await {
        RunOutcome::Failed(failure) => {
            assert_eq!(failure.phase, PhaseTag::Visualizing);
            assert!(failure.run.history.is_empty());
        }
        RunOutcome::Done(_) => panic!("client failure must be terminal"),
    }
}

#[tokio::test]
async fn test_dataset_untouched_by_full_run() {
    let client = MockModelClient::new(&[PLAN_RESPONSE, GOOD_CODE]);
    let dataset = category_dataset();
    let before = dataset.fingerprint();

    let outcome = run_pipeline(&client, "q", &dataset, &test_config()).await;
    assert!(outcome.is_done());
    assert_eq!(dataset.fingerprint(), before);
}

#[tokio::test]
async fn test_identical_scripts_yield_identical_code_and_verdicts() {
    let dataset = category_dataset();
    let mut generated = Vec::new();
    for _ in 0..2 {
        let client = MockModelClient::new(&[PLAN_RESPONSE, GOOD_CODE]);
        match run_pipeline(&client, "q", &dataset, &test_config()).await {
            RunOutcome::Done(success) => {
                let attempt = success.run.last_attempt().unwrap().clone();
                generated.push((attempt.code.source, attempt.verdict));
            }
            RunOutcome::Failed(failure) => panic!("unexpected failure: {}", failure.reason),
        }
    }
    assert_eq!(generated[0], generated[1]);
}
