use thiserror::Error;

/// Top-level error type for Querent.
///
/// Pipeline stages define their own error types in their crates; this enum
/// covers the concerns shared by every crate (configuration, I/O and
/// serialization) so that `?` works when loading and saving settings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuerentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for QuerentError {
    fn from(err: toml::de::Error) -> Self {
        QuerentError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for QuerentError {
    fn from(err: toml::ser::Error) -> Self {
        QuerentError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for QuerentError {
    fn from(err: serde_json::Error) -> Self {
        QuerentError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Querent operations.
pub type Result<T> = std::result::Result<T, QuerentError>;
