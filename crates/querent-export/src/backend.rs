//! Storage backends for exported documents.
//!
//! Each backend uploads bytes to a path and reports a backend-specific raw
//! identifier, from which it derives the canonical URL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use querent_core::types::BackendKind;
use tracing::debug;

use crate::error::ExportError;

pub const XML_MIME_TYPE: &str = "application/xml";

/// Upload capability shared by every storage destination.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Store `bytes` at `path`, returning the backend's raw identifier.
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, ExportError>;

    /// Canonical URL for a raw identifier returned by [`upload`](Self::upload).
    fn canonical_url(&self, raw_id: &str) -> String;
}

// =============================================================================
// Local filesystem
// =============================================================================

/// Writes under a root directory. Raw id is the absolute file path.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, ExportError> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExportError::storage(BackendKind::Local, e))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| ExportError::storage(BackendKind::Local, e))?;
        let absolute = tokio::fs::canonicalize(&target)
            .await
            .map_err(|e| ExportError::storage(BackendKind::Local, e))?;
        debug!(path = %absolute.display(), "Wrote local export");
        Ok(absolute.to_string_lossy().into_owned())
    }

    fn canonical_url(&self, raw_id: &str) -> String {
        if raw_id.starts_with('/') {
            format!("file://{}", raw_id)
        } else {
            format!("file:///{}", raw_id.replace('\\', "/"))
        }
    }
}

// =============================================================================
// Object stores (S3, Azure Blob, GCS)
// =============================================================================

/// Cloud object storage. Raw id is the object key.
pub struct ObjectStoreBackend {
    kind: BackendKind,
    container: String,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn s3(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self::with_kind(BackendKind::S3, bucket, store)
    }

    pub fn azure(container: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self::with_kind(BackendKind::Azure, container, store)
    }

    pub fn gcs(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self::with_kind(BackendKind::Gcs, bucket, store)
    }

    fn with_kind(kind: BackendKind, container: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            kind,
            container: container.into(),
            store,
        }
    }

    /// Bucket or container name.
    pub fn container(&self) -> &str {
        &self.container
    }
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("kind", &self.kind)
            .field("container", &self.container)
            .finish()
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, ExportError> {
        let location = ObjectPath::parse(path).map_err(|e| ExportError::storage(self.kind, e))?;
        self.store
            .put(&location, PutPayload::from(bytes))
            .await
            .map_err(|e| ExportError::storage(self.kind, e))?;
        debug!(backend = %self.kind, key = %location, "Uploaded object");
        Ok(location.to_string())
    }

    fn canonical_url(&self, raw_id: &str) -> String {
        let scheme = match self.kind {
            BackendKind::S3 => "s3",
            BackendKind::Azure => "azure",
            BackendKind::Gcs => "gs",
            BackendKind::Local => "file",
            BackendKind::Gdrive => "gdrive",
        };
        format!("{}://{}/{}", scheme, self.container, raw_id)
    }
}

// =============================================================================
// Google Drive
// =============================================================================

pub type DriveClientError = Box<dyn std::error::Error + Send + Sync>;

/// Minimal Drive API surface needed for exports.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// Create a file and return its Drive file id.
    async fn create_file(
        &self,
        name: &str,
        folder_id: Option<&str>,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DriveClientError>;
}

/// Uploads through a [`DriveClient`]. Raw id is the Drive file id.
pub struct DriveBackend {
    client: Arc<dyn DriveClient>,
    folder_id: Option<String>,
}

impl DriveBackend {
    pub fn new(client: Arc<dyn DriveClient>, folder_id: Option<String>) -> Self {
        Self { client, folder_id }
    }
}

#[async_trait]
impl StorageBackend for DriveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gdrive
    }

    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, ExportError> {
        // Drive has no directories in the path sense; the last segment is the name.
        let name = path.rsplit('/').next().unwrap_or(path);
        let file_id = self
            .client
            .create_file(name, self.folder_id.as_deref(), XML_MIME_TYPE, bytes)
            .await
            .map_err(|e| ExportError::storage(BackendKind::Gdrive, e))?;
        debug!(file_id = %file_id, "Uploaded to Drive");
        Ok(file_id)
    }

    fn canonical_url(&self, raw_id: &str) -> String {
        format!("gdrive://{}", raw_id)
    }
}
