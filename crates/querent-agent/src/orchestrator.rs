//! Query orchestrator: question in, exported result out.
//!
//! Steps run strictly in order: discover, generate, validate, execute,
//! summarize, serialize, export. Nothing reaches the database before the
//! guard accepts it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use querent_core::config::QuerentConfig;
use querent_core::safety::{CandidateQuery, QueryGuard};
use querent_core::types::ResultSummary;
use querent_engine::{catalog, EngineRegistry, QueryExecutor, SqlEngine};
use querent_export::{xml, StorageExporter};
use tracing::{debug, info, warn};

use crate::collaborator::{
    GenerationRequest, ResultSummarizer, RowCountSummarizer, SqlGenerator, FALLBACK_SUMMARY,
};
use crate::error::AgentError;
use crate::types::{QueryRequest, QueryResponse};

/// Coordinates the full pipeline. Shareable across tasks via `Arc`.
pub struct QueryOrchestrator {
    engines: EngineRegistry,
    engine_kind: String,
    default_database: String,
    discovery_timeout: Duration,
    guard: QueryGuard,
    executor: QueryExecutor,
    exporter: StorageExporter,
    generator: Arc<dyn SqlGenerator>,
    summarizer: Arc<dyn ResultSummarizer>,
}

impl QueryOrchestrator {
    /// Create an orchestrator using the deterministic summarizer.
    pub fn new(
        config: &QuerentConfig,
        engines: EngineRegistry,
        exporter: StorageExporter,
        generator: Arc<dyn SqlGenerator>,
    ) -> Self {
        Self {
            engines,
            engine_kind: config.database.engine.clone(),
            default_database: config.database.name.clone(),
            discovery_timeout: Duration::from_millis(config.database.discovery_timeout_ms),
            guard: QueryGuard::new(&config.guard),
            executor: QueryExecutor::from_config(&config.database, &config.guard),
            exporter,
            generator,
            summarizer: Arc::new(RowCountSummarizer),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ResultSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn guard(&self) -> &QueryGuard {
        &self.guard
    }

    /// Answer one question.
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryResponse, AgentError> {
        let started = Instant::now();
        let database = request
            .database
            .clone()
            .unwrap_or_else(|| self.default_database.clone());

        // 1. Schema
        let schema = catalog::discover(
            &self.engines,
            &database,
            &self.engine_kind,
            request.table_filter.as_deref(),
            self.discovery_timeout,
        )
        .await
        .map_err(|e| {
            warn!(database = %database, "Schema discovery failed: {}", e);
            AgentError::Discovery(e)
        })?;
        if schema.is_empty() {
            warn!(database = %database, "No tables found");
            return Err(AgentError::EmptySchema(database));
        }
        info!(tables = schema.tables.len(), "Schema ready");
        let schema = Arc::new(schema);

        // 2. Generation
        let generated = self
            .generator
            .generate(&GenerationRequest {
                question: &request.question,
                schema: &schema,
                table_filter: request.table_filter.as_deref(),
            })
            .await
            .map_err(|e| AgentError::Generation(e.to_string()))?;

        let sql = match (&generated.error, generated.sql.as_deref().map(str::trim)) {
            (None, Some(sql)) if !sql.is_empty() => sql.to_string(),
            (error, _) => {
                let reason = error
                    .clone()
                    .unwrap_or_else(|| "no SQL generated".to_string());
                info!(confidence = generated.confidence, "Generator declined: {}", reason);
                return Err(AgentError::GenerationDeclined {
                    reason,
                    reasoning: generated.reasoning,
                    confidence: generated.confidence,
                });
            }
        };
        debug!(sql = %sql, confidence = generated.confidence, "SQL generated");

        // 3. Validation
        let validated = self
            .guard
            .validate(&CandidateQuery::new(sql, Arc::clone(&schema)))
            .map_err(|e| {
                warn!("Generated SQL rejected: {}", e);
                e
            })?;

        // 4. Execution
        let engine = self.resolve_engine()?;
        let result = self
            .executor
            .execute(&validated, engine.as_ref())
            .await
            .map_err(AgentError::Execution)?;

        // 5. Summary
        let summary = match self
            .summarizer
            .summarize(&request.question, validated.sql(), &result)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarizer failed, using fallback: {}", e);
                ResultSummary::new(FALLBACK_SUMMARY)
            }
        };

        // 6-7. Serialize and export. Failures here keep the computed result.
        let backend = request
            .backend
            .unwrap_or_else(|| self.exporter.default_backend());
        let exported = match xml::serialize(&request.question, &validated, &result, &summary) {
            Ok(document) => {
                self.exporter
                    .export(&document, backend, request.storage_path.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };
        let (location, export_failure) = match exported {
            Ok(location) => (Some(location), None),
            Err(e) => {
                warn!(backend = %backend, "Export failed, returning result without file: {}", e);
                (None, Some(Arc::new(e)))
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            rows = result.row_count,
            elapsed_s = elapsed,
            exported = location.is_some(),
            "Question answered"
        );

        Ok(QueryResponse {
            sql: validated.sql().to_string(),
            row_count: result.row_count,
            columns: result.columns.clone(),
            truncated: result.truncated,
            xml_path: location.as_ref().map(|l| l.raw_id.clone()),
            xml_url: location.as_ref().map(|l| l.canonical_url.clone()),
            storage_type: location.as_ref().map(|l| l.backend_kind),
            summary: summary.summary,
            key_findings: summary.key_findings,
            data_quality_notes: summary.data_quality_notes,
            confidence: generated.confidence,
            reasoning: generated.reasoning,
            execution_time_seconds: (elapsed * 100.0).round() / 100.0,
            export_error: export_failure.as_ref().map(|e| e.to_string()),
            export_failure,
            result,
            location,
        })
    }

    /// Engine handle for execution. A missing handle is a connection
    /// problem, so nothing has run yet.
    fn resolve_engine(&self) -> Result<Arc<dyn SqlEngine>, AgentError> {
        self.engines.resolve(&self.engine_kind).map_err(|e| {
            warn!(engine = %self.engine_kind, "Engine unavailable: {}", e);
            AgentError::Discovery(e)
        })
    }
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("engines", &self.engines)
            .field("engine_kind", &self.engine_kind)
            .field("default_database", &self.default_database)
            .field("exporter", &self.exporter)
            .finish()
    }
}
