//! CLI argument parsing for the chart pipeline.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

/// Chart pipeline CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chartflow",
    about = "LLM-driven, verified chart generation over a tabular dataset"
)]
pub struct Args {
    /// CSV file with the dataset to analyze
    #[arg(short, long)]
    pub data: PathBuf,

    /// Analytics question to answer with a chart
    #[arg(short, long)]
    pub question: Option<String>,

    /// JSON file mapping scenario names to their questions
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Scenario name to look up in --scenarios
    #[arg(long)]
    pub scenario: Option<String>,

    /// Where to write the figure JSON
    #[arg(short, long, default_value = "figure.json")]
    pub output: PathBuf,

    /// Print the generated code of the final attempt
    #[arg(long)]
    pub show_code: bool,

    /// Maximum visualization retries (overrides the environment)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Sandbox wall-clock timeout in seconds (overrides the environment)
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Args {
    /// The question for this run: given directly, or looked up in the
    /// scenario map the way the original deployment keyed prompts by sheet.
    pub fn resolve_question(&self) -> anyhow::Result<String> {
        if let Some(question) = &self.question {
            return Ok(question.clone());
        }
        let (path, name) = match (&self.scenarios, &self.scenario) {
            (Some(path), Some(name)) => (path, name),
            _ => anyhow::bail!("provide --question, or both --scenarios and --scenario"),
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenarios file: {}", path.display()))?;
        let map: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("invalid scenarios JSON: {}", path.display()))?;
        map.get(name)
            .cloned()
            .with_context(|| format!("scenario '{}' not found in {}", name, path.display()))
    }
}
