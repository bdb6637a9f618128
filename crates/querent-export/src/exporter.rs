//! Storage exporter: picks a backend, derives the object path and uploads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use querent_core::types::{BackendKind, StorageLocation};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::StorageBackend;
use crate::error::ExportError;
use crate::xml::ExportDocument;

/// Characters of the question kept in generated file names.
const QUESTION_PREFIX_CHARS: usize = 30;

/// Routes documents to the configured storage backends.
pub struct StorageExporter {
    backends: HashMap<BackendKind, Arc<dyn StorageBackend>>,
    default_backend: BackendKind,
    path_prefix: String,
}

impl StorageExporter {
    pub fn new(default_backend: BackendKind, path_prefix: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_backend,
            path_prefix: path_prefix.into(),
        }
    }

    /// Register a backend, replacing any previous one of the same kind.
    pub fn register(&mut self, backend: Arc<dyn StorageBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn default_backend(&self) -> BackendKind {
        self.default_backend
    }

    pub fn has_backend(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Upload a document to `backend_kind`.
    ///
    /// Without a hint, the object path is derived from the question and the
    /// document timestamp. There is no fallback to another backend.
    pub async fn export(
        &self,
        document: &ExportDocument,
        backend_kind: BackendKind,
        path_hint: Option<&str>,
    ) -> Result<StorageLocation, ExportError> {
        let backend = self.backends.get(&backend_kind).ok_or_else(|| {
            ExportError::storage(backend_kind, "no storage backend configured")
        })?;

        let path = object_path(
            &self.path_prefix,
            document.question(),
            path_hint,
            document.generated_at(),
        )
        .map_err(|cause| ExportError::storage(backend_kind, cause))?;

        let raw_id = backend
            .upload(document.to_bytes(), &path)
            .await
            .map_err(|e| {
                warn!(backend = %backend_kind, path = %path, "Export failed: {}", e);
                e
            })?;
        let canonical_url = backend.canonical_url(&raw_id);

        info!(backend = %backend_kind, url = %canonical_url, "Document exported");
        Ok(StorageLocation {
            backend_kind,
            canonical_url,
            raw_id,
            path,
        })
    }
}

impl std::fmt::Debug for StorageExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.backends.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("StorageExporter")
            .field("backends", &kinds)
            .field("default_backend", &self.default_backend)
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

/// Object path for an export.
///
/// A hint is used as given (with `.xml` appended when missing) but must be
/// relative and free of `..` segments. Otherwise the name is
/// `<prefix>/<question>_<YYYYMMDD_HHMMSS>_<8 hex>.xml`.
pub fn object_path(
    path_prefix: &str,
    question: &str,
    path_hint: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, String> {
    if let Some(hint) = path_hint.map(str::trim).filter(|h| !h.is_empty()) {
        if hint.starts_with('/') || hint.starts_with('\\') || hint.contains(':') {
            return Err(format!("storage path must be relative: {}", hint));
        }
        if hint.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(format!("storage path must not contain '..': {}", hint));
        }
        return Ok(if hint.ends_with(".xml") {
            hint.to_string()
        } else {
            format!("{}.xml", hint)
        });
    }

    let safe_question: String = question
        .chars()
        .take(QUESTION_PREFIX_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let unique = Uuid::new_v4().simple().to_string();
    let file_name = format!(
        "{}_{}_{}.xml",
        safe_question,
        now.format("%Y%m%d_%H%M%S"),
        &unique[..8]
    );

    let prefix = path_prefix.trim_matches('/');
    Ok(if prefix.is_empty() {
        file_name
    } else {
        format!("{}/{}", prefix, file_name)
    })
}
