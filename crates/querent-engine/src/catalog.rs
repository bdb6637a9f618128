//! Schema discovery.
//!
//! Introspection runs through [`SqlEngine::fetch`] with each engine's own
//! metadata queries, then native column types are normalized into
//! [`ColumnType`].

use std::time::Duration;

use querent_core::types::{CellValue, ColumnSchema, ColumnType, EngineKind, SchemaCatalog, TableSchema};
use tracing::{debug, info, warn};

use crate::engine::{EngineRegistry, SqlEngine};
use crate::error::EngineError;

/// Upper bound on metadata rows read per introspection query.
const METADATA_ROW_LIMIT: usize = 100_000;

struct IntrospectionQueries {
    /// Returns `(table_name, description)` rows.
    tables: &'static str,
    /// Returns `(column_name, native_type, nullable)` rows for one table.
    columns: &'static str,
}

fn introspection_queries(kind: EngineKind) -> IntrospectionQueries {
    match kind {
        EngineKind::Postgresql => IntrospectionQueries {
            tables: "SELECT c.relname, obj_description(c.oid, 'pg_class') \
                     FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                     WHERE n.nspname = 'public' AND c.relkind IN ('r', 'p') \
                     ORDER BY c.relname",
            columns: "SELECT column_name, data_type, is_nullable \
                      FROM information_schema.columns \
                      WHERE table_schema = 'public' AND table_name = $1 \
                      ORDER BY ordinal_position",
        },
        EngineKind::Mysql => IntrospectionQueries {
            tables: "SELECT table_name, table_comment FROM information_schema.tables \
                     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                     ORDER BY table_name",
            columns: "SELECT column_name, column_type, is_nullable \
                      FROM information_schema.columns \
                      WHERE table_schema = DATABASE() AND table_name = ? \
                      ORDER BY ordinal_position",
        },
        EngineKind::Sqlite => IntrospectionQueries {
            tables: "SELECT name, NULL FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
            columns: "SELECT name, type, \"notnull\" = 0 FROM pragma_table_info(?1) ORDER BY cid",
        },
    }
}

/// Discover the schema of `database` on the engine named `engine_kind`.
///
/// `table_filter` keeps only exactly matching table names, in engine
/// listing order. A filter that matches nothing yields an empty catalog.
pub async fn discover(
    registry: &EngineRegistry,
    database: &str,
    engine_kind: &str,
    table_filter: Option<&[String]>,
    timeout: Duration,
) -> Result<SchemaCatalog, EngineError> {
    let engine = registry.resolve(engine_kind)?;

    let catalog = tokio::time::timeout(
        timeout,
        introspect(engine.as_ref(), database, table_filter),
    )
    .await
    .map_err(|_| {
        warn!(database, engine = engine_kind, "Schema discovery timed out");
        EngineError::Connection(format!(
            "schema discovery timed out after {} ms",
            timeout.as_millis()
        ))
    })??;

    info!(
        database,
        engine = %catalog.engine,
        tables = catalog.tables.len(),
        "Schema discovered"
    );
    Ok(catalog)
}

/// Introspect one engine without a timeout.
pub async fn introspect(
    engine: &dyn SqlEngine,
    database: &str,
    table_filter: Option<&[String]>,
) -> Result<SchemaCatalog, EngineError> {
    let kind = engine.kind();
    let queries = introspection_queries(kind);

    let listing = engine
        .fetch(queries.tables, &[], METADATA_ROW_LIMIT)
        .await
        .map_err(introspection_failed)?;

    let mut tables = Vec::new();
    for row in &listing.rows {
        let Some(name) = row.first().and_then(cell_text) else {
            continue;
        };
        if let Some(filter) = table_filter {
            if !filter.iter().any(|wanted| wanted == &name) {
                continue;
            }
        }
        let description = row
            .get(1)
            .and_then(cell_text)
            .filter(|d| !d.trim().is_empty());

        let column_rows = engine
            .fetch(queries.columns, std::slice::from_ref(&name), METADATA_ROW_LIMIT)
            .await
            .map_err(introspection_failed)?;

        let columns = column_rows
            .rows
            .iter()
            .filter_map(|r| {
                let column_name = r.first().and_then(cell_text)?;
                let native_type = r.get(1).and_then(cell_text).unwrap_or_default();
                let nullable = r.get(2).map(is_truthy).unwrap_or(true);
                Some(ColumnSchema {
                    name: column_name,
                    column_type: ColumnType::from_native(kind, &native_type),
                    native_type,
                    nullable,
                })
            })
            .collect::<Vec<_>>();

        debug!(table = %name, columns = columns.len(), "Table introspected");
        tables.push(TableSchema {
            name,
            description,
            columns,
        });
    }

    Ok(SchemaCatalog {
        database: database.to_string(),
        engine: kind,
        tables,
    })
}

fn introspection_failed(err: EngineError) -> EngineError {
    match err {
        EngineError::Execution { engine_message } => {
            EngineError::Connection(format!("schema introspection failed: {}", engine_message))
        }
        other => other,
    }
}

fn cell_text(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Null => None,
        CellValue::Text(s) => Some(s.clone()),
        CellValue::Integer(i) => Some(i.to_string()),
        CellValue::Float(f) => Some(f.to_string()),
        CellValue::Boolean(b) => Some(b.to_string()),
        CellValue::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// `YES`/`1`/`true` style nullability flags.
fn is_truthy(cell: &CellValue) -> bool {
    match cell {
        CellValue::Boolean(b) => *b,
        CellValue::Integer(i) => *i != 0,
        CellValue::Text(s) => matches!(s.trim().to_ascii_uppercase().as_str(), "YES" | "Y" | "1" | "TRUE"),
        _ => false,
    }
}
