//! External collaborators: SQL generation and result summarization.
//!
//! Both are traits so model-backed implementations can live outside this
//! crate. Generated SQL is untrusted and always goes through the guard.

use async_trait::async_trait;
use querent_core::types::{CellValue, QueryResult, ResultSummary, SchemaCatalog};
use serde::{Deserialize, Serialize};

pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Summary used when the summarizer fails.
pub const FALLBACK_SUMMARY: &str = "Query executed successfully";

/// Input to a SQL generator.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaCatalog,
    pub table_filter: Option<&'a [String]>,
}

/// Generator output. `sql` is absent when the generator declines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSql {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Turns a question plus schema into candidate SQL.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<GeneratedSql, CollaboratorError>;
}

/// Returns a fixed statement regardless of the question.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    sql: String,
}

impl StaticGenerator {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

#[async_trait]
impl SqlGenerator for StaticGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest<'_>,
    ) -> Result<GeneratedSql, CollaboratorError> {
        Ok(GeneratedSql {
            sql: Some(self.sql.clone()),
            reasoning: "SQL supplied by caller".to_string(),
            confidence: 1.0,
            error: None,
        })
    }
}

/// Describes a result in prose.
#[async_trait]
pub trait ResultSummarizer: Send + Sync {
    async fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> Result<ResultSummary, CollaboratorError>;
}

/// Deterministic summary built from row and null counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCountSummarizer;

#[async_trait]
impl ResultSummarizer for RowCountSummarizer {
    async fn summarize(
        &self,
        _question: &str,
        _sql: &str,
        result: &QueryResult,
    ) -> Result<ResultSummary, CollaboratorError> {
        let rows = result.row_count;
        let noun = if rows == 1 { "row" } else { "rows" };
        let summary = format!(
            "Query returned {} {} across {} columns.",
            rows,
            noun,
            result.columns.len()
        );

        let mut key_findings = Vec::new();
        if let Some(first) = result.rows.first() {
            let preview: Vec<String> = result
                .columns
                .iter()
                .zip(first)
                .map(|(col, cell)| format!("{}={}", col.name, preview_cell(cell)))
                .collect();
            key_findings.push(format!("First row: {}", preview.join(", ")));
        }

        let mut data_quality_notes = Vec::new();
        if result.truncated {
            data_quality_notes.push(format!("Result truncated to {} rows.", rows));
        }
        for (i, col) in result.columns.iter().enumerate() {
            let nulls = result
                .rows
                .iter()
                .filter(|r| r.get(i).is_some_and(|c| c.is_null()))
                .count();
            if nulls > 0 {
                data_quality_notes.push(format!(
                    "Column {} has {} null values.",
                    col.name, nulls
                ));
            }
        }

        Ok(ResultSummary {
            summary,
            key_findings,
            data_quality_notes,
        })
    }
}

fn preview_cell(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => "NULL".to_string(),
        CellValue::Integer(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Boolean(b) => b.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
