//! Natural-language query agent.
//!
//! Ties schema discovery, SQL generation, validation, execution and export
//! into a single [`QueryOrchestrator::run`] call.

pub mod collaborator;
pub mod error;
pub mod orchestrator;
pub mod types;

pub use collaborator::{
    CollaboratorError, GeneratedSql, GenerationRequest, ResultSummarizer, RowCountSummarizer,
    SqlGenerator, StaticGenerator, FALLBACK_SUMMARY,
};
pub use error::AgentError;
pub use orchestrator::QueryOrchestrator;
pub use types::{QueryRequest, QueryResponse};
