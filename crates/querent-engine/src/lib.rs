//! Database side of the query pipeline: engine handles, schema discovery
//! and bounded query execution.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod executor;
pub mod sqlite;

pub use catalog::discover;
pub use engine::{EngineRegistry, RawColumn, RowSet, SqlEngine};
pub use error::EngineError;
pub use executor::{execute, QueryExecutor};
pub use sqlite::{SqliteEngine, SqlitePool};
