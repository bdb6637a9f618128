//! Error types for the query pipeline.

use querent_core::error::QuerentError;
use querent_core::safety::UnsafeQueryError;
use querent_engine::EngineError;
use querent_export::ExportError;

/// Errors from one orchestration run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("schema discovery failed: {0}")]
    Discovery(EngineError),
    #[error("no tables found in database {0}")]
    EmptySchema(String),
    #[error("SQL generation failed: {0}")]
    Generation(String),
    #[error("SQL generation declined: {reason}")]
    GenerationDeclined {
        reason: String,
        reasoning: String,
        confidence: f64,
    },
    #[error("{0}")]
    Unsafe(#[from] UnsafeQueryError),
    #[error("query execution failed: {0}")]
    Execution(EngineError),
    #[error("export setup failed: {0}")]
    Export(#[from] ExportError),
    #[error(transparent)]
    Core(#[from] QuerentError),
}

impl AgentError {
    /// True if the statement reached the database before the failure.
    pub fn query_ran(&self) -> bool {
        matches!(self, AgentError::Execution(_))
    }
}
