pub mod config;
pub mod error;
pub mod safety;
pub mod types;

pub use config::QuerentConfig;
pub use error::{QuerentError, Result};
pub use safety::{CandidateQuery, QueryGuard, StatementKind, UnsafeQueryError, UnsafeReason, ValidatedQuery};
pub use types::*;
