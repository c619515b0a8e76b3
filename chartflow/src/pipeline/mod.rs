//! Chart pipeline module
//!
//! Two-phase LLM pipeline: analyze the question against the dataset schema
//! into a transformation plan, generate visualization code against that
//! plan, execute it in the sandbox, verify the result structurally and
//! retry with diagnostics until the bound is reached.

pub mod cli;
pub mod extract;
pub mod phase1_analyze;
pub mod phase2_visualize;
pub mod prompts;
pub mod types;
pub mod verify;
pub mod workflow;

// Re-export commonly used types
pub use types::{
    Attempt, ExecutionResult, GeneratedCode, PhaseTag, PipelineRun, PlotRow, RunFailure,
    RunOutcome, RunSuccess, TransformationPlan, VerificationVerdict,
};
pub use verify::VerifyPolicy;
pub use workflow::run_pipeline;
