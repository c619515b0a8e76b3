//! Common fixtures for pipeline tests

use std::collections::VecDeque;
use std::sync::Mutex;

use chartflow::client::{ChatMessage, ModelClient};
use chartflow::dataset::{CellValue, Dataset};
use chartflow::error::ClientError;

/// Scripted model client: hands out canned responses in order and records
/// every request for inspection.
pub struct MockModelClient {
    responses: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockModelClient {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Content of the nth recorded request, all messages concatenated.
    pub fn call_text(&self, index: usize) -> String {
        self.calls.lock().unwrap()[index]
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl ModelClient for MockModelClient {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, ClientError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ClientError::EmptyResponse)
    }
}

/// 10 rows with a `category` column holding A×6, B×3, C×1.
pub fn category_dataset() -> Dataset {
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for (value, n) in [("A", 6), ("B", 3), ("C", 1)] {
        for _ in 0..n {
            rows.push(vec![
                CellValue::Number(rows.len() as f64 + 1.0),
                CellValue::Text(value.to_string()),
            ]);
        }
    }
    Dataset::new(vec!["Id".to_string(), "category".to_string()], rows)
}

/// A well-formed phase-1 plan response.
pub const PLAN_RESPONSE: &str = r#"{
    "categories": ["Group A", "Group B", "Group C"],
    "derived_fields": [],
    "rationale": "The category column already answers the question."
}"#;

/// Generated code that counts rows per category and charts them.
pub const GOOD_CODE: &str = r#"chart_type = "bar"
plot_data = tbl.count_by(data, "category")
fig = chart.bar(plot_data, "category", "count", "Rows per category")"#;

/// Generated code referencing a column the dataset does not have.
pub const MISSING_COLUMN_CODE: &str = r#"chart_type = "bar"
plot_data = tbl.count_by(data, "Missing")
fig = chart.bar(plot_data, "Missing", "count", "Counts")"#;
