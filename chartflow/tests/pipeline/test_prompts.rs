//! Tests for prompt construction
//!
//! Prompts must be deterministic, carry the schema plus a bounded sample
//! (never the full dataset) and thread prior failures into retries.

use chartflow::client::Role;
use chartflow::dataset::{CellValue, Dataset, SchemaSummary};
use chartflow::pipeline::prompts::{analysis_messages, visualization_messages};
use chartflow::pipeline::{
    Attempt, ExecutionResult, GeneratedCode, TransformationPlan, VerificationVerdict,
};

use super::common::category_dataset;

fn plan() -> TransformationPlan {
    TransformationPlan {
        categories: vec!["Group A".to_string(), "Group B".to_string()],
        derived_fields: Vec::new(),
        rationale: "existing column".to_string(),
    }
}

fn big_text_dataset() -> Dataset {
    let rows = (0..40)
        .map(|i| {
            vec![
                CellValue::Number(i as f64),
                CellValue::Text(format!("observation text number {}", i)),
            ]
        })
        .collect();
    Dataset::new(vec!["Id".to_string(), "Description".to_string()], rows)
}

#[test]
fn test_analysis_messages_shape() {
    let schema = SchemaSummary::of(&category_dataset(), 5);
    let messages = analysis_messages("most frequent category", &schema);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[1].content.contains("most frequent category"));
    assert!(messages[1].content.contains("category"));
}

#[test]
fn test_prompts_are_deterministic() {
    let schema = SchemaSummary::of(&category_dataset(), 5);
    let first = analysis_messages("q", &schema);
    let second = analysis_messages("q", &schema);
    assert_eq!(first, second);

    let viz_first = visualization_messages("q", &schema, &plan(), &[]);
    let viz_second = visualization_messages("q", &schema, &plan(), &[]);
    assert_eq!(viz_first, viz_second);
}

#[test]
fn test_sample_is_bounded_and_rest_of_dataset_stays_out() {
    let dataset = big_text_dataset();
    let schema = SchemaSummary::of(&dataset, 5);
    let messages = analysis_messages("q", &schema);
    let text = &messages[1].content;
    // Rows within the sample window appear; later rows never do
    assert!(text.contains("observation text number 0"));
    assert!(text.contains("observation text number 4"));
    assert!(!text.contains("observation text number 5"));
    assert!(!text.contains("observation text number 39"));
}

#[test]
fn test_visualization_prompt_embeds_plan() {
    let schema = SchemaSummary::of(&category_dataset(), 5);
    let messages = visualization_messages("q", &schema, &plan(), &[]);
    let text = &messages[1].content;
    assert!(text.contains("Group A"));
    assert!(text.contains("Group B"));
}

#[test]
fn test_retry_prompt_carries_prior_code_and_reasons() {
    let schema = SchemaSummary::of(&category_dataset(), 5);
    let prior = vec![Attempt {
        code: GeneratedCode {
            source: "plot_data = tbl.count_by(data, \"Missing\")".to_string(),
            attempt: 0,
        },
        execution: ExecutionResult::Failure {
            error: "column 'Missing' does not exist".to_string(),
            stack_summary: String::new(),
            timed_out: false,
            output: Vec::new(),
        },
        verdict: VerificationVerdict::Fail {
            reasons: vec!["execution failed: column 'Missing' does not exist".to_string()],
        },
        started_at: chrono::Utc::now(),
    }];
    let messages = visualization_messages("q", &schema, &plan(), &prior);
    let text = &messages[1].content;
    assert!(text.contains("FAILED"));
    assert!(text.contains("tbl.count_by(data, \"Missing\")"));
    assert!(text.contains("column 'Missing' does not exist"));
}

#[test]
fn test_first_attempt_has_no_failure_section() {
    let schema = SchemaSummary::of(&category_dataset(), 5);
    let messages = visualization_messages("q", &schema, &plan(), &[]);
    assert!(!messages[1].content.contains("FAILED"));
}
