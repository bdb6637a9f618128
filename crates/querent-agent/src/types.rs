use std::sync::Arc;

use querent_core::types::{BackendKind, QueryResult, ResultColumn, StorageLocation};
use querent_export::ExportError;
use serde::Serialize;

/// One natural-language question to answer.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    /// Database name; the configured one when unset.
    pub database: Option<String>,
    pub table_filter: Option<Vec<String>>,
    /// Object path for the export, without the `.xml` suffix.
    pub storage_path: Option<String>,
    /// Export destination; the configured default when unset.
    pub backend: Option<BackendKind>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.table_filter = Some(tables);
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Outcome of a successful run.
///
/// When serialization or upload failed after the query ran, the export
/// fields are empty, `export_error` says why and `export_failure` keeps
/// the typed error.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub sql: String,
    pub row_count: usize,
    pub columns: Vec<ResultColumn>,
    pub truncated: bool,
    pub xml_path: Option<String>,
    pub xml_url: Option<String>,
    pub storage_type: Option<BackendKind>,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub data_quality_notes: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub execution_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_error: Option<String>,
    #[serde(skip)]
    pub export_failure: Option<Arc<ExportError>>,
    /// Full result rows, kept out of the JSON response.
    #[serde(skip)]
    pub result: QueryResult,
    #[serde(skip)]
    pub location: Option<StorageLocation>,
}

impl QueryResponse {
    pub fn exported(&self) -> bool {
        self.location.is_some()
    }
}
