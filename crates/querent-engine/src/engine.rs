//! Engine abstraction and registry.
//!
//! Every relational engine sits behind [`SqlEngine`]. SQLite ships with the
//! crate; Postgres and MySQL drivers plug in by implementing the trait and
//! registering with an [`EngineRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use querent_core::types::{CellValue, EngineKind};
use tracing::debug;

use crate::error::EngineError;

/// Column metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    /// Declared type, when the engine knows one (expressions have none).
    pub native_type: Option<String>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, native_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.map(str::to_string),
        }
    }
}

/// Rows fetched from an engine, before type normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<RawColumn>,
    pub rows: Vec<Vec<CellValue>>,
    /// True if more than `max_rows` rows were available.
    pub truncated: bool,
}

/// A connection source for one relational engine.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Run `sql` with positional text parameters, reading at most
    /// `max_rows` rows.
    ///
    /// Dropping the returned future must release any pooled connection.
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        max_rows: usize,
    ) -> Result<RowSet, EngineError>;
}

/// Engine handles keyed by kind.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: HashMap<EngineKind, Arc<dyn SqlEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine, replacing any previous handle of the same kind.
    pub fn register(&mut self, engine: Arc<dyn SqlEngine>) {
        let kind = engine.kind();
        debug!(engine = %kind, "Engine registered");
        self.engines.insert(kind, engine);
    }

    pub fn get(&self, kind: EngineKind) -> Result<Arc<dyn SqlEngine>, EngineError> {
        self.engines
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::Connection(format!("no connection configured for {}", kind)))
    }

    /// Parse an engine name and look up its handle.
    pub fn resolve(&self, engine_kind: &str) -> Result<Arc<dyn SqlEngine>, EngineError> {
        let kind: EngineKind = engine_kind
            .parse()
            .map_err(|_| EngineError::UnsupportedEngine(engine_kind.to_string()))?;
        self.get(kind)
    }

    pub fn kinds(&self) -> Vec<EngineKind> {
        let mut kinds: Vec<EngineKind> = self.engines.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
