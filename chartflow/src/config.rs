//! Environment-backed configuration.
//!
//! Read once at process start and immutable afterwards; concurrent runs
//! share it without locking. A missing credential is a startup failure,
//! never a per-run error.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::pipeline::verify::VerifyPolicy;

pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Per-run knobs for the pipeline. Temperatures follow the two-phase split:
/// low for categorization consistency, zero for strict code adherence.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub model: String,
    pub categorization_temperature: f32,
    pub visualization_temperature: f32,
    pub max_retries: u32,
    pub execution_timeout_secs: u64,
    pub sample_rows: usize,
    pub verify: VerifyPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            categorization_temperature: 0.2,
            visualization_temperature: 0.0,
            max_retries: 3,
            execution_timeout_secs: 30,
            sample_rows: 5,
            verify: VerifyPolicy::default(),
        }
    }
}

/// Process-wide configuration: the credential plus run defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub run: RunConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let defaults = RunConfig::default();
        let run = RunConfig {
            model: std::env::var("MODEL_NAME").unwrap_or(defaults.model),
            categorization_temperature: env_parse(
                "CHARTFLOW_CATEGORIZATION_TEMP",
                defaults.categorization_temperature,
            )?,
            visualization_temperature: env_parse(
                "CHARTFLOW_VISUALIZATION_TEMP",
                defaults.visualization_temperature,
            )?,
            max_retries: env_parse("CHARTFLOW_MAX_RETRIES", defaults.max_retries)?,
            execution_timeout_secs: env_parse(
                "CHARTFLOW_EXEC_TIMEOUT_SECS",
                defaults.execution_timeout_secs,
            )?,
            sample_rows: env_parse("CHARTFLOW_SAMPLE_ROWS", defaults.sample_rows)?,
            verify: VerifyPolicy::default(),
        };
        Ok(Self { api_key, run })
    }
}

fn env_parse<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
    }
}
