use anyhow::Context;
use clap::Parser;

use chartflow::client::OpenRouterClient;
use chartflow::config::Config;
use chartflow::dataset::Dataset;
use chartflow::pipeline::cli::Args;
use chartflow::pipeline::{run_pipeline, ExecutionResult, PlotRow, RunOutcome};
use chartflow_sdk::{log_artifact_saved, log_found, log_info, log_warning};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::from_env().context("configuration error")?;
    if let Some(max_retries) = args.max_retries {
        config.run.max_retries = max_retries;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.run.execution_timeout_secs = timeout_secs;
    }

    let question = args.resolve_question()?;
    let dataset = Dataset::from_csv_path(&args.data)
        .with_context(|| format!("failed to load dataset: {}", args.data.display()))?;
    log_found!(dataset.row_count(), "rows in dataset");
    log_info!("Question: {}", question);

    let client = OpenRouterClient::new(config.api_key.clone(), config.run.model.clone());
    let outcome = run_pipeline(&client, &question, &dataset, &config.run).await;

    match outcome {
        RunOutcome::Done(success) => {
            log_info!(
                "Selected chart type: {}",
                success.chart_type.as_str().to_uppercase()
            );

            let figure_json = serde_json::to_string_pretty(&success.figure)?;
            std::fs::write(&args.output, figure_json)
                .with_context(|| format!("failed to write {}", args.output.display()))?;
            log_artifact_saved!(args.output.display(), "figure JSON");

            // The verification table: computed from the data, shown so the
            // chart can be checked against it.
            println!("\nVerification data ({} rows):", success.plot_data.len());
            print!("{}", render_plot_rows(&success.plot_data));

            if args.show_code {
                if let Some(attempt) = success.run.last_attempt() {
                    println!("\nGenerated code:\n{}", attempt.code.source);
                }
            }
            if success.run.retries > 0 {
                log_info!("Succeeded after {} retries", success.run.retries);
            }
        }
        RunOutcome::Failed(failure) => {
            log_warning!("Pipeline failed while {}: {}", failure.phase, failure.reason);
            if let Some(attempt) = failure.run.last_attempt() {
                println!("\nLast generated code:\n{}", attempt.code.source);
                if let ExecutionResult::Failure { error, .. } = &attempt.execution {
                    println!("\nLast error: {}", error);
                }
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

fn render_plot_rows(rows: &[PlotRow]) -> String {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut out = format!("| {} |\n", columns.join(" | "));
    out.push_str(&format!(
        "|{}|\n",
        columns.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
    ));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| match row.get(c) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => String::new(),
            })
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}
