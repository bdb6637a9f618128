use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{QuerentError, Result};

/// Top-level configuration for Querent.
///
/// Loaded from `~/.querent/config.toml` by default. Each section corresponds
/// to one pipeline stage or cross-cutting concern. Credentials for storage
/// backends live here and nowhere else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl QuerentConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: QuerentConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| QuerentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Engine kind: "postgresql", "mysql" or "sqlite".
    pub engine: String,
    /// Logical database name reported in catalogs.
    pub name: String,
    /// SQLite database file.
    pub path: String,
    /// Pooled connections per engine.
    pub pool_size: usize,
    /// Wall-clock limit for a single query, in milliseconds.
    pub query_timeout_ms: u64,
    /// Wall-clock limit for schema introspection, in milliseconds.
    pub discovery_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: "query".to_string(),
            path: "~/.querent/query.db".to_string(),
            pool_size: 4,
            query_timeout_ms: 30_000,
            discovery_timeout_ms: 10_000,
        }
    }
}

/// SQL safety policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Maximum rows returned per query. Injected as LIMIT when missing and
    /// enforced again by the executor.
    pub row_cap: usize,
    /// Function names allowed on top of the built-in whitelist.
    pub extra_allowed_functions: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            row_cap: 10_000,
            extra_allowed_functions: Vec::new(),
        }
    }
}

/// Export destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind: "local", "s3", "azure", "gcs" or "gdrive".
    pub backend: String,
    /// Directory prefix for generated object names.
    pub path_prefix: String,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub s3: S3StorageConfig,
    #[serde(default)]
    pub azure: AzureStorageConfig,
    #[serde(default)]
    pub gcs: GcsStorageConfig,
    #[serde(default)]
    pub gdrive: GdriveStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            path_prefix: "query_results".to_string(),
            local: LocalStorageConfig::default(),
            s3: S3StorageConfig::default(),
            azure: AzureStorageConfig::default(),
            gcs: GcsStorageConfig::default(),
            gdrive: GdriveStorageConfig::default(),
        }
    }
}

/// Local filesystem export root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    pub root: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: "./results".to_string(),
        }
    }
}

/// S3 (or S3-compatible) bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services such as MinIO.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub allow_http: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            allow_http: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// Azure Blob Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureStorageConfig {
    pub account: String,
    pub container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

/// Google Cloud Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsStorageConfig {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<String>,
}

/// Google Drive settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GdriveStorageConfig {
    /// Parent folder for uploaded files; Drive root when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}
