//! SQLite engine over a small pool of read-only connections.
//!
//! Connections are opened with `SQLITE_OPEN_READ_ONLY` and
//! `PRAGMA query_only = ON`. A semaphore bounds checkouts; the checked-out
//! guard puts its connection back on drop, so a cancelled query still
//! returns its connection once the blocking task unwinds.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use querent_core::types::{CellValue, EngineKind};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::engine::{RawColumn, RowSet, SqlEngine};
use crate::error::EngineError;

struct PoolInner {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

/// Fixed-size pool of read-only SQLite connections.
pub struct SqlitePool {
    inner: Arc<PoolInner>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl SqlitePool {
    /// Open `size` read-only connections to an existing database file.
    pub fn open(path: &Path, size: usize) -> Result<Self, EngineError> {
        let size = size.max(1);
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(open_read_only(path)?);
        }
        info!(path = %path.display(), size, "SQLite pool opened");

        Ok(Self {
            inner: Arc::new(PoolInner {
                path: path.to_path_buf(),
                idle: Mutex::new(idle),
            }),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Wait for a free connection.
    pub async fn acquire(&self) -> Result<PooledConnection, EngineError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Connection(format!("SQLite pool closed: {}", e)))?;

        let idle = {
            let mut idle = self
                .inner
                .idle
                .lock()
                .map_err(|e| EngineError::Connection(format!("Pool lock poisoned: {}", e)))?;
            idle.pop()
        };
        let conn = match idle {
            Some(conn) => conn,
            // A connection was lost to a panic inside a blocking task.
            None => open_read_only(&self.inner.path)?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool")
            .field("path", &self.inner.path)
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self.conn.as_ref() {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            match self.pool.idle.lock() {
                Ok(mut idle) => idle.push(conn),
                Err(e) => warn!("Dropping SQLite connection, pool lock poisoned: {}", e),
            }
        }
    }
}

fn open_read_only(path: &Path) -> Result<Connection, EngineError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        EngineError::Connection(format!(
            "Failed to open database {}: {}",
            path.display(),
            e
        ))
    })?;
    conn.execute_batch("PRAGMA query_only = ON;")
        .map_err(|e| EngineError::Connection(format!("Failed to set pragmas: {}", e)))?;
    Ok(conn)
}

/// Interrupts the running statement unless disarmed first.
struct InterruptOnDrop {
    handle: Option<InterruptHandle>,
}

impl InterruptOnDrop {
    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Interrupting cancelled SQLite statement");
            handle.interrupt();
        }
    }
}

/// The built-in SQLite engine.
#[derive(Debug)]
pub struct SqliteEngine {
    pool: SqlitePool,
}

impl SqliteEngine {
    pub fn open(path: &Path, pool_size: usize) -> Result<Self, EngineError> {
        Ok(Self {
            pool: SqlitePool::open(path, pool_size)?,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        max_rows: usize,
    ) -> Result<RowSet, EngineError> {
        let conn = self.pool.acquire().await?;
        let interrupt = InterruptOnDrop {
            handle: Some(conn.get_interrupt_handle()),
        };

        let sql = sql.to_string();
        let params = params.to_vec();
        let outcome =
            tokio::task::spawn_blocking(move || read_rows(&conn, &sql, &params, max_rows)).await;
        interrupt.disarm();

        outcome.map_err(|e| EngineError::execution(format!("query task failed: {}", e)))?
    }
}

fn read_rows(
    conn: &Connection,
    sql: &str,
    params: &[String],
    max_rows: usize,
) -> Result<RowSet, EngineError> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(EngineError::execution("statement is not read-only"));
    }

    let columns: Vec<RawColumn> = stmt
        .columns()
        .iter()
        .map(|c| RawColumn::new(c.name(), c.decl_type()))
        .collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = cursor.next()? {
        if rows.len() == max_rows {
            truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(to_cell(row.get_ref(i)?));
        }
        rows.push(cells);
    }

    Ok(RowSet {
        columns,
        rows,
        truncated,
    })
}

fn to_cell(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Float(f),
        ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => CellValue::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sales (id INTEGER PRIMARY KEY, customer_name TEXT NOT NULL,
                                 revenue REAL, note TEXT, payload BLOB);
             INSERT INTO sales VALUES (1, 'Acme', 1200.5, NULL, x'cafe');
             INSERT INTO sales VALUES (2, 'Globex', 800.0, 'late', NULL);
             INSERT INTO sales VALUES (3, 'Initech', 300.25, NULL, NULL);",
        )
        .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_fetch_rows_and_declared_types() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 2).unwrap();

        let rows = engine
            .fetch("SELECT id, customer_name, revenue, payload, revenue * 2 AS doubled FROM sales ORDER BY id", &[], 100)
            .await
            .unwrap();

        assert_eq!(rows.columns.len(), 5);
        assert_eq!(rows.columns[0], RawColumn::new("id", Some("INTEGER")));
        assert_eq!(rows.columns[1].native_type.as_deref(), Some("TEXT"));
        assert_eq!(rows.columns[4].native_type, None);
        assert_eq!(rows.rows.len(), 3);
        assert!(!rows.truncated);
        assert_eq!(rows.rows[0][1], CellValue::Text("Acme".to_string()));
        assert_eq!(rows.rows[0][3], CellValue::Blob(vec![0xca, 0xfe]));
        assert_eq!(rows.rows[1][3], CellValue::Null);
        assert_eq!(rows.rows[2][2], CellValue::Float(300.25));
    }

    #[tokio::test]
    async fn test_fetch_with_params() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 1).unwrap();
        let rows = engine
            .fetch(
                "SELECT id FROM sales WHERE customer_name = ?1",
                &["Globex".to_string()],
                10,
            )
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec![CellValue::Integer(2)]]);
    }

    #[tokio::test]
    async fn test_max_rows_truncates() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 1).unwrap();
        let rows = engine.fetch("SELECT id FROM sales", &[], 2).await.unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert!(rows.truncated);

        let rows = engine.fetch("SELECT id FROM sales", &[], 3).await.unwrap();
        assert_eq!(rows.rows.len(), 3);
        assert!(!rows.truncated);
    }

    #[tokio::test]
    async fn test_write_statement_refused() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 1).unwrap();
        let err = engine
            .fetch("UPDATE sales SET revenue = 0", &[], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution { .. }));

        // Data untouched.
        let rows = engine
            .fetch("SELECT revenue FROM sales WHERE id = 1", &[], 10)
            .await
            .unwrap();
        assert_eq!(rows.rows[0][0], CellValue::Float(1200.5));
    }

    #[tokio::test]
    async fn test_multiple_statements_refused() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 1).unwrap();
        let result = engine.fetch("SELECT 1; SELECT 2", &[], 10).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sql_error_is_execution_error() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 1).unwrap();
        let err = engine
            .fetch("SELECT * FROM missing_table", &[], 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing_table"));
    }

    #[test]
    fn test_missing_database_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteEngine::open(&dir.path().join("absent.db"), 1).unwrap_err();
        assert!(matches!(err, EngineError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connection_returned_after_fetch() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 3).unwrap();
        assert_eq!(engine.pool().available(), 3);
        engine.fetch("SELECT 1", &[], 1).await.unwrap();
        let _ = engine.fetch("SELECT nope", &[], 1).await;
        assert_eq!(engine.pool().available(), 3);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_free_connection() {
        let (_dir, path) = sample_db();
        let pool = SqlitePool::open(&path, 1).unwrap();
        let held = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(waiting.is_err());

        drop(held);
        assert_eq!(pool.available(), 1);
        let again = pool.acquire().await.unwrap();
        let one: i64 = again.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_query_is_interrupted_and_connection_returned() {
        let (_dir, path) = sample_db();
        let engine = SqliteEngine::open(&path, 1).unwrap();
        let slow = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000000000) \
                    SELECT COUNT(*) FROM c";

        let outcome =
            tokio::time::timeout(Duration::from_millis(100), engine.fetch(slow, &[], 1)).await;
        assert!(outcome.is_err());

        // The blocking task sees the interrupt and hands the connection back.
        let mut returned = false;
        for _ in 0..200 {
            if engine.pool().available() == 1 {
                returned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(returned, "connection was not returned after cancellation");
        engine.fetch("SELECT 1", &[], 1).await.unwrap();
    }

    #[test]
    fn test_query_only_pragma_set() {
        let (_dir, path) = sample_db();
        let conn = open_read_only(&path).unwrap();
        let on: i64 = conn
            .query_row("PRAGMA query_only", [], |r| r.get(0))
            .unwrap();
        assert_eq!(on, 1);
    }
}
