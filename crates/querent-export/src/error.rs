//! Error types for serialization and storage export.

use querent_core::types::BackendKind;

/// Errors from the result serializer and storage backends.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExportError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error ({backend_kind}): {cause}")]
    Storage {
        backend_kind: BackendKind,
        cause: String,
    },
    #[error("storage configuration error: {0}")]
    Config(String),
}

impl ExportError {
    pub fn storage(backend_kind: BackendKind, cause: impl std::fmt::Display) -> Self {
        ExportError::Storage {
            backend_kind,
            cause: cause.to_string(),
        }
    }
}
