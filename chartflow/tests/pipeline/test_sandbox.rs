//! Tests for the sandboxed code executor
//!
//! The executor must never raise past its own boundary: syntax errors,
//! missing columns, runaway loops and hostile mutation all come back as
//! `Failure` values (or isolated no-ops), within the configured budget.

use std::time::{Duration, Instant};

use super::common::*;
use chartflow::pipeline::ExecutionResult;
use chartflow::sandbox::{self, SandboxOptions};

fn run(code: &str) -> ExecutionResult {
    sandbox::execute(code, &category_dataset(), &SandboxOptions::default())
}

#[test]
fn test_good_code_produces_all_bindings() {
    match run(GOOD_CODE) {
        ExecutionResult::Success {
            figure,
            chart_type,
            plot_data,
            ..
        } => {
            assert_eq!(chart_type, "bar");
            assert_eq!(plot_data.len(), 3);
            let counts: Vec<i64> = plot_data
                .iter()
                .map(|row| row.get("count").and_then(|v| v.as_i64()).unwrap())
                .collect();
            assert_eq!(counts, vec![6, 3, 1]);
            assert_eq!(figure.traces.len(), 1);
            assert_eq!(figure.traces[0].y, vec![6.0, 3.0, 1.0]);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_syntax_error_is_a_failure_not_a_crash() {
    match run("this is not lua ===") {
        ExecutionResult::Failure {
            error, timed_out, ..
        } => {
            assert!(!error.is_empty());
            assert!(!timed_out);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_missing_column_failure_names_the_column() {
    match run(MISSING_COLUMN_CODE) {
        ExecutionResult::Failure { error, .. } => {
            assert!(error.contains("Missing"), "error was: {}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_null_cells_of_real_columns_stay_nil() {
    use chartflow::dataset::{CellValue, Dataset};
    let dataset = Dataset::new(
        vec!["category".to_string()],
        vec![
            vec![CellValue::Text("A".to_string())],
            vec![CellValue::Null],
            vec![CellValue::Text("A".to_string())],
        ],
    );
    let code = r#"chart_type = "bar"
plot_data = tbl.count_by(data, "category")
fig = chart.bar(plot_data, "category", "count", "t")"#;
    match sandbox::execute(code, &dataset, &SandboxOptions::default()) {
        ExecutionResult::Success { plot_data, .. } => {
            assert_eq!(plot_data.len(), 1);
            assert_eq!(plot_data[0].get("count").and_then(|v| v.as_i64()), Some(2));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_infinite_loop_hits_instruction_limit() {
    let opts = SandboxOptions {
        timeout: Duration::from_secs(60),
        instruction_limit: 100_000,
    };
    match sandbox::execute("while true do end", &category_dataset(), &opts) {
        ExecutionResult::Failure {
            error, timed_out, ..
        } => {
            assert!(error.contains("instruction limit"), "error was: {}", error);
            assert!(!timed_out);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_infinite_loop_hits_wall_clock_timeout() {
    let opts = SandboxOptions {
        timeout: Duration::from_millis(200),
        instruction_limit: i64::MAX,
    };
    let start = Instant::now();
    match sandbox::execute("while true do end", &category_dataset(), &opts) {
        ExecutionResult::Failure {
            error, timed_out, ..
        } => {
            assert!(timed_out, "error was: {}", error);
            assert!(start.elapsed() < Duration::from_secs(10));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_dataset_is_isolated_from_hostile_code() {
    let dataset = category_dataset();
    let before = dataset.fingerprint();
    let hostile = r#"
data[1]["category"] = "tampered"
table.remove(data, 2)
data[3] = nil
chart_type = "bar"
plot_data = { { category = "A", count = 1 } }
fig = chart.bar(plot_data, "category", "count", "t")
"#;
    let result = sandbox::execute(hostile, &dataset, &SandboxOptions::default());
    assert!(result.is_success());
    assert_eq!(dataset.fingerprint(), before);
}

#[test]
fn test_missing_binding_is_a_failure() {
    let code = r#"chart_type = "bar""#;
    match run(code) {
        ExecutionResult::Failure { error, .. } => {
            assert!(error.contains("plot_data") || error.contains("fig"), "error was: {}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_wrong_typed_binding_is_a_failure() {
    let code = r#"
chart_type = 42
plot_data = tbl.count_by(data, "category")
fig = chart.bar(plot_data, "category", "count", "t")
"#;
    match run(code) {
        ExecutionResult::Failure { error, .. } => {
            assert!(error.contains("chart_type"), "error was: {}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_dangerous_globals_are_absent() {
    let code = r#"
print(os == nil, io == nil, require == nil, load == nil)
chart_type = "bar"
plot_data = tbl.count_by(data, "category")
fig = chart.bar(plot_data, "category", "count", "t")
"#;
    match run(code) {
        ExecutionResult::Success { output, .. } => {
            assert_eq!(output, vec!["true\ttrue\ttrue\ttrue".to_string()]);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_print_output_is_captured_and_capped() {
    let code = r#"
for i = 1, 200 do print("line " .. i) end
chart_type = "bar"
plot_data = tbl.count_by(data, "category")
fig = chart.bar(plot_data, "category", "count", "t")
"#;
    match run(code) {
        ExecutionResult::Success { output, .. } => {
            assert_eq!(output.len(), sandbox::MAX_OUTPUT_LINES + 1);
            assert!(output.last().unwrap().contains("truncated"));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_runtime_error_carries_stack_summary() {
    let code = r#"
local function inner() error("exploded") end
inner()
"#;
    match run(code) {
        ExecutionResult::Failure {
            error,
            stack_summary,
            ..
        } => {
            assert!(error.contains("exploded"));
            // mlua attaches a traceback to runtime errors
            assert!(stack_summary.contains("traceback") || stack_summary.is_empty());
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_period_grouping_over_dates() {
    use chartflow::dataset::{CellValue, Dataset};
    use chrono::NaiveDate;
    let date = |y, m, d| CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap());
    let dataset = Dataset::new(
        vec!["Created".to_string()],
        vec![
            vec![date(2024, 1, 3)],
            vec![date(2024, 1, 20)],
            vec![date(2024, 2, 1)],
        ],
    );
    let code = r#"
chart_type = "line"
plot_data = tbl.count_by_period(data, "Created", "month")
fig = chart.line(plot_data, "period", "count", "Trend")
"#;
    match sandbox::execute(code, &dataset, &SandboxOptions::default()) {
        ExecutionResult::Success { plot_data, .. } => {
            assert_eq!(plot_data.len(), 2);
            assert_eq!(
                plot_data[0].get("period").and_then(|v| v.as_str()),
                Some("2024-01")
            );
            assert_eq!(plot_data[0].get("count").and_then(|v| v.as_i64()), Some(2));
        }
        other => panic!("expected success, got {:?}", other),
    }
}
