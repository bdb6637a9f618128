//! Error types for database access.

/// Errors from engines, schema discovery and query execution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
    #[error("query timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("execution error: {engine_message}")]
    Execution { engine_message: String },
}

impl EngineError {
    pub fn execution(message: impl Into<String>) -> Self {
        EngineError::Execution {
            engine_message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::execution(err.to_string())
    }
}
