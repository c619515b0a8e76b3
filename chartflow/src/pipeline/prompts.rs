//! Prompt construction for both pipeline phases.
//!
//! Pure functions of their inputs. Prompts embed the schema summary and its
//! bounded row sample — never the full dataset — so token cost stays flat
//! regardless of dataset size. On retry, the prior code and failure reasons
//! are appended so the next generation can self-correct.

use crate::client::ChatMessage;
use crate::dataset::{ColumnKind, SchemaSummary};
use crate::pipeline::types::{Attempt, ExecutionResult, TransformationPlan};

/// Longest failure-reason text carried into a retry prompt, per attempt.
const MAX_FEEDBACK_LEN: usize = 800;

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a data analyst preparing a tabular dataset for visualization.

Given the dataset schema, a small sample and the user's question, propose how the data should be categorized and which derived fields would support the visualization.

Output format MUST be a single JSON object with exactly this shape:
{
  "categories": ["<short descriptive group name>", ...],
  "derived_fields": [
    {
      "name": "<new column name>",
      "source_column": "<existing column>",
      "rules": [
        { "category": "<one of categories>", "keywords": ["<keyword>", ...] }
      ]
    }
  ],
  "rationale": "<one or two sentences on why this grouping answers the question>"
}

Rules:
1. categories: 3 to 8 VERY SHORT (2-4 words) descriptive names, in the language of the user's question.
2. derived_fields: only derive from columns that exist in the schema. Leave the list empty when an existing column already answers the question.
3. Output ONLY the JSON object. No markdown fences, no prose around it."#;

const VISUALIZATION_SYSTEM_PROMPT: &str = r#"You are a Data Visualization Architect. Your task is to generate Lua code that turns the prepared data into a chart.

The execution environment provides:
- `data`: array of row tables keyed by column name. Reading a column that does not exist raises an error.
- `tbl` helpers: tbl.count_by(rows, col), tbl.sum_by(rows, col, value_col), tbl.mean_by(rows, col, value_col), tbl.count_by_period(rows, date_col, "year"|"month"|"day"), tbl.filter_eq(rows, col, value), tbl.sort_by(rows, col, descending), tbl.head(rows, n)
- `chart` constructors: chart.bar(rows, x_col, y_col, title), chart.line(rows, x_col, y_col, title), chart.pie(rows, names_col, values_col, title), chart.scatter(rows, x_col, y_col, title)

INSTRUCTIONS:
1. Analyze the user's request to determine the best chart type.
   - Trends over time -> line chart (x = the date column, grouped with tbl.count_by_period)
   - Comparisons/counts -> bar chart
   - Proportions -> pie chart
2. STRICTLY NO HALLUCINATIONS. Derive `plot_data` by aggregating `data` with the tbl helpers. Never write literal values that are not computed from the data.
3. Define exactly these three globals:
   - `chart_type` (string): "bar", "line", "pie" or "scatter".
   - `plot_data`: the aggregated rows the plot is drawn from.
   - `fig`: the figure built from plot_data with a chart constructor.
4. All chart titles and labels MUST be in the language of the user's request.
5. Return ONLY Lua code. No markdown fences, no commentary.

Example:
-- Request: "Show observations by division"
chart_type = "bar"
plot_data = tbl.count_by(data, "Division")
fig = chart.bar(plot_data, "Division", "count", "Observations by division")"#;

/// Messages for the phase-1 analysis call.
pub fn analysis_messages(question: &str, schema: &SchemaSummary) -> Vec<ChatMessage> {
    let mut user = String::new();
    user.push_str(&format!("User question: \"{}\"\n\n", question));
    user.push_str("Dataset schema:\n");
    user.push_str(&schema_lines(schema));
    if let Some(text_column) = schema.primary_text_column() {
        user.push_str(&format!(
            "\nThe main free-text column appears to be '{}'.\n",
            text_column
        ));
    }
    user.push_str("\nData sample:\n");
    user.push_str(&sample_table(schema));
    user.push_str("\nProduce the JSON plan now.");

    vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

/// Messages for a phase-2 visualization call, carrying the plan and any
/// prior failed attempts.
pub fn visualization_messages(
    question: &str,
    schema: &SchemaSummary,
    plan: &TransformationPlan,
    prior: &[Attempt],
) -> Vec<ChatMessage> {
    let mut user = String::new();
    user.push_str(&format!("User request: \"{}\"\n\n", question));
    user.push_str("Transformation plan from the analysis phase:\n");
    user.push_str(&plan_block(plan));
    user.push_str("\nDataset schema:\n");
    user.push_str(&schema_lines(schema));
    user.push_str("\nData sample:\n");
    user.push_str(&sample_table(schema));
    if !prior.is_empty() {
        user.push_str("\n");
        user.push_str(&failure_feedback(prior));
    }
    user.push_str("\nGenerate the visualization code now.");

    vec![
        ChatMessage::system(VISUALIZATION_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

fn schema_lines(schema: &SchemaSummary) -> String {
    let mut out = format!("{} rows\n", schema.row_count);
    for column in &schema.columns {
        let mut line = format!("- {} ({})", column.name, column.kind.as_str());
        match column.kind {
            ColumnKind::Categorical => {
                line.push_str(&format!(
                    ": {} distinct values, e.g. {}",
                    column.distinct_values,
                    column.sample_values.join(", ")
                ));
            }
            ColumnKind::Date => {
                if let Some((min, max)) = column.date_range {
                    line.push_str(&format!(": {} to {}", min, max));
                }
            }
            ColumnKind::Text => {
                line.push_str(&format!(": {} distinct values", column.distinct_values));
            }
            ColumnKind::Number => {}
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn sample_table(schema: &SchemaSummary) -> String {
    let header: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    let mut out = format!("| {} |\n", header.join(" | "));
    out.push_str(&format!(
        "|{}|\n",
        header.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
    ));
    for row in &schema.sample {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out
}

fn plan_block(plan: &TransformationPlan) -> String {
    // The plan struct serializes deterministically in declaration order
    serde_json::to_string_pretty(plan).unwrap_or_else(|_| format!("{:?}", plan))
}

/// Render prior attempts into the feedback section of a retry prompt:
/// the code that failed and every reason verification gave.
fn failure_feedback(prior: &[Attempt]) -> String {
    let mut out = String::from(
        "Previous attempts FAILED. Fix the problems listed below; do not repeat them.\n",
    );
    for attempt in prior {
        out.push_str(&format!("\n--- Attempt {} ---\n", attempt.code.attempt + 1));
        out.push_str("Code:\n");
        out.push_str(&attempt.code.source);
        out.push('\n');
        match &attempt.execution {
            ExecutionResult::Failure {
                error,
                stack_summary,
                ..
            } => {
                out.push_str(&format!("Execution error: {}\n", clip(error)));
                if !stack_summary.is_empty() {
                    out.push_str(&format!("{}\n", clip(stack_summary)));
                }
            }
            ExecutionResult::Success { .. } => {}
        }
        for reason in attempt.verdict.reasons() {
            out.push_str(&format!("Verification: {}\n", clip(reason)));
        }
    }
    out
}

fn clip(text: &str) -> String {
    if text.len() <= MAX_FEEDBACK_LEN {
        text.to_string()
    } else {
        let mut cut = MAX_FEEDBACK_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}
