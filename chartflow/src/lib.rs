// Model client boundary
pub mod client;

// Environment-backed configuration
pub mod config;

// In-memory dataset and schema summary
pub mod dataset;

// Error taxonomy
pub mod error;

// Renderable figure model
pub mod figure;

// Pipeline phases and orchestration
pub mod pipeline;

// Sandboxed execution of generated code
pub mod sandbox;
