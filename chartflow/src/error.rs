//! Error taxonomy for the pipeline.
//!
//! Startup problems are `ConfigError` and fatal. Model-call problems are
//! `ClientError` and terminate the phase that made the call. Malformed model
//! output is a typed parse error carrying the raw text, so a bad completion
//! is a testable failure mode rather than a best-effort coercion. Sandbox
//! and verification failures are not errors at all: they are data
//! (`ExecutionResult::Failure`, `VerificationVerdict::Fail`) consumed by the
//! retry loop.

use thiserror::Error;

/// Startup-time configuration errors. The process must not serve runs
/// without a credential and model identifier.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Errors crossing the model client boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned an empty completion")]
    EmptyResponse,
}

/// Phase-1 model output that does not conform to the plan shape.
/// Carries the raw text so the caller can surface it; missing fields are
/// never guessed.
#[derive(Debug, Error)]
#[error("failed to parse transformation plan: {message}")]
pub struct PlanParseError {
    pub message: String,
    pub raw: String,
}

/// Phase-2 model output with no extractable code.
#[derive(Debug, Error)]
#[error("no extractable code block in model output")]
pub struct CodeParseError {
    pub raw: String,
}

/// Failure of the analysis phase. Terminal for the run: without a plan
/// there is nothing coherent to visualize against.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Parse(#[from] PlanParseError),
}

/// Failure of one visualization-phase model call. Parse failures are
/// retryable by the orchestrator; client failures end the run.
#[derive(Debug, Error)]
pub enum VisualizationError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Parse(#[from] CodeParseError),
}
