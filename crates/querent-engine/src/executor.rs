//! Query execution with a timeout and a row cap.

use std::time::{Duration, Instant};

use querent_core::config::{DatabaseConfig, GuardConfig};
use querent_core::safety::ValidatedQuery;
use querent_core::types::{CellValue, ColumnType, EngineKind, QueryResult, ResultColumn};
use tracing::{debug, info, warn};

use crate::engine::{RawColumn, SqlEngine};
use crate::error::EngineError;

/// Run a validated statement verbatim and normalize the result.
///
/// At most `row_cap` rows are kept regardless of the statement's own LIMIT;
/// `truncated` is set when more were available. On timeout the engine
/// future is dropped, which cancels the statement.
pub async fn execute(
    validated: &ValidatedQuery,
    engine: &dyn SqlEngine,
    timeout: Duration,
    row_cap: usize,
) -> Result<QueryResult, EngineError> {
    let started = Instant::now();
    debug!(sql = %validated.sql(), engine = %engine.kind(), "Executing query");

    let fetched = tokio::time::timeout(timeout, engine.fetch(validated.sql(), &[], row_cap))
        .await
        .map_err(|_| {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(timeout_ms, "Query timed out");
            EngineError::Timeout { timeout_ms }
        })?;
    let row_set = fetched.map_err(|e| {
        warn!("Query execution failed: {}", e);
        e
    })?;

    let mut rows = row_set.rows;
    let mut truncated = row_set.truncated;
    if rows.len() > row_cap {
        rows.truncate(row_cap);
        truncated = true;
    }
    let columns = resolve_columns(engine.kind(), &row_set.columns, &rows);
    let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    info!(
        rows = rows.len(),
        truncated,
        elapsed_ms = execution_time_ms,
        "Query executed"
    );

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        execution_time_ms,
        truncated,
    })
}

/// Executor settings taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    pub timeout: Duration,
    pub row_cap: usize,
}

impl QueryExecutor {
    pub fn from_config(database: &DatabaseConfig, guard: &GuardConfig) -> Self {
        Self {
            timeout: Duration::from_millis(database.query_timeout_ms),
            row_cap: guard.row_cap,
        }
    }

    pub async fn execute(
        &self,
        validated: &ValidatedQuery,
        engine: &dyn SqlEngine,
    ) -> Result<QueryResult, EngineError> {
        execute(validated, engine, self.timeout, self.row_cap).await
    }
}

/// Declared type when the engine reports one, else the first non-null
/// cell's type, else `Other`.
fn resolve_columns(
    kind: EngineKind,
    raw: &[RawColumn],
    rows: &[Vec<CellValue>],
) -> Vec<ResultColumn> {
    raw.iter()
        .enumerate()
        .map(|(i, col)| {
            let declared = col
                .native_type
                .as_deref()
                .filter(|t| !t.trim().is_empty());
            let column_type = match declared {
                Some(native) => ColumnType::from_native(kind, native),
                None => rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .find_map(CellValue::implied_type)
                    .unwrap_or(ColumnType::Other),
            };
            ResultColumn {
                name: col.name.clone(),
                column_type,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use querent_core::safety::QueryGuard;

    use crate::engine::RowSet;

    struct FixedEngine {
        rows: usize,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FixedEngine {
        fn with_rows(rows: usize) -> Self {
            Self {
                rows,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SqlEngine for FixedEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Postgresql
        }

        async fn fetch(
            &self,
            _sql: &str,
            _params: &[String],
            _max_rows: usize,
        ) -> Result<RowSet, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            // Deliberately ignores max_rows.
            let rows = (0..self.rows)
                .map(|i| vec![CellValue::Integer(i as i64), CellValue::Null])
                .collect();
            Ok(RowSet {
                columns: vec![
                    RawColumn::new("id", Some("int8")),
                    RawColumn::new("label", None),
                ],
                rows,
                truncated: false,
            })
        }
    }

    fn validated(sql: &str) -> ValidatedQuery {
        QueryGuard::default().validate_sql(sql).unwrap()
    }

    #[tokio::test]
    async fn test_row_cap_enforced_independently() {
        let engine = FixedEngine::with_rows(25);
        let result = execute(&validated("SELECT id, label FROM t"), &engine, Duration::from_secs(1), 10)
            .await
            .unwrap();
        assert_eq!(result.row_count, 10);
        assert_eq!(result.rows.len(), 10);
        assert!(result.truncated);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exact_row_cap_not_truncated() {
        let engine = FixedEngine::with_rows(10);
        let result = execute(&validated("SELECT id FROM t"), &engine, Duration::from_secs(1), 10)
            .await
            .unwrap();
        assert_eq!(result.row_count, 10);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_column_types_declared_then_inferred() {
        let engine = FixedEngine::with_rows(2);
        let result = execute(&validated("SELECT id, label FROM t"), &engine, Duration::from_secs(1), 10)
            .await
            .unwrap();
        assert_eq!(result.columns[0].column_type, ColumnType::Integer);
        // Every cell is NULL and nothing was declared.
        assert_eq!(result.columns[1].column_type, ColumnType::Other);
        assert_eq!(result.column_names(), vec!["id", "label"]);
    }

    #[test]
    fn test_inference_uses_first_non_null() {
        let raw = vec![RawColumn::new("total", None)];
        let rows = vec![
            vec![CellValue::Null],
            vec![CellValue::Float(1.5)],
            vec![CellValue::Text("x".to_string())],
        ];
        let cols = resolve_columns(EngineKind::Sqlite, &raw, &rows);
        assert_eq!(cols[0].column_type, ColumnType::Float);
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut engine = FixedEngine::with_rows(1);
        engine.delay = Some(Duration::from_secs(10));
        let err = execute(&validated("SELECT 1"), &engine, Duration::from_millis(20), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn test_executor_from_config() {
        let database = DatabaseConfig {
            query_timeout_ms: 1234,
            ..DatabaseConfig::default()
        };
        let guard = GuardConfig {
            row_cap: 3,
            ..GuardConfig::default()
        };
        let executor = QueryExecutor::from_config(&database, &guard);
        assert_eq!(executor.timeout, Duration::from_millis(1234));

        let engine = FixedEngine::with_rows(5);
        let result = executor.execute(&validated("SELECT id FROM t"), &engine).await.unwrap();
        assert_eq!(result.row_count, 3);
        assert!(result.truncated);
    }
}
