use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Relational engine a catalog or connection belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgresql,
    Mysql,
    Sqlite,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Postgresql => write!(f, "postgresql"),
            EngineKind::Mysql => write!(f, "mysql"),
            EngineKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(EngineKind::Postgresql),
            "mysql" => Ok(EngineKind::Mysql),
            "sqlite" => Ok(EngineKind::Sqlite),
            _ => Err(format!("Unknown engine kind: {}", s)),
        }
    }
}

/// Normalized column type shared by every engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Timestamp,
    Other,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(ColumnType::Integer),
            "float" => Ok(ColumnType::Float),
            "string" => Ok(ColumnType::String),
            "boolean" => Ok(ColumnType::Boolean),
            "timestamp" => Ok(ColumnType::Timestamp),
            "other" => Ok(ColumnType::Other),
            _ => Err(format!("Unknown column type: {}", s)),
        }
    }
}

impl ColumnType {
    /// Map an engine-native type name onto the shared enumeration.
    ///
    /// Unknown names map to `Other`. SQLite declared types additionally go
    /// through SQLite's own affinity rules, since it accepts arbitrary names.
    pub fn from_native(engine: EngineKind, native: &str) -> Self {
        let lowered = native.trim().to_ascii_lowercase();

        // MySQL convention: tinyint(1) is a boolean.
        if engine == EngineKind::Mysql && lowered.replace(' ', "") == "tinyint(1)" {
            return ColumnType::Boolean;
        }

        let base = strip_type_modifiers(&lowered);
        let exact = match base.as_str() {
            "int" | "integer" | "smallint" | "bigint" | "tinyint" | "mediumint" | "int2"
            | "int4" | "int8" | "serial" | "smallserial" | "bigserial" | "year" => {
                Some(ColumnType::Integer)
            }
            "real" | "float" | "float4" | "float8" | "double" | "double precision"
            | "numeric" | "decimal" | "money" => Some(ColumnType::Float),
            "text" | "varchar" | "character varying" | "char" | "character" | "nchar"
            | "nvarchar" | "bpchar" | "tinytext" | "mediumtext" | "longtext" | "clob"
            | "string" | "uuid" | "enum" | "citext" | "name" => Some(ColumnType::String),
            "bool" | "boolean" | "bit" => Some(ColumnType::Boolean),
            "timestamp" | "timestamptz" | "timestamp with time zone"
            | "timestamp without time zone" | "datetime" | "date" | "time" | "timetz"
            | "time with time zone" | "time without time zone" => Some(ColumnType::Timestamp),
            _ => None,
        };
        if let Some(t) = exact {
            return t;
        }

        if engine == EngineKind::Sqlite && !base.is_empty() {
            let upper = base.to_ascii_uppercase();
            if upper.contains("INT") {
                return ColumnType::Integer;
            }
            if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
                return ColumnType::String;
            }
            if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
                return ColumnType::Float;
            }
        }

        ColumnType::Other
    }
}

/// Drop `(precision, scale)` parameters and MySQL display modifiers.
fn strip_type_modifiers(lowered: &str) -> String {
    let mut out = String::with_capacity(lowered.len());
    let mut depth = 0usize;
    for c in lowered.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace()
        .filter(|w| *w != "unsigned" && *w != "zerofill" && *w != "signed")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Storage destination for exported documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Gdrive,
    S3,
    Local,
    Azure,
    Gcs,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gdrive => write!(f, "gdrive"),
            BackendKind::S3 => write!(f, "s3"),
            BackendKind::Local => write!(f, "local"),
            BackendKind::Azure => write!(f, "azure"),
            BackendKind::Gcs => write!(f, "gcs"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gdrive" => Ok(BackendKind::Gdrive),
            "s3" => Ok(BackendKind::S3),
            "local" => Ok(BackendKind::Local),
            "azure" => Ok(BackendKind::Azure),
            "gcs" => Ok(BackendKind::Gcs),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

// =============================================================================
// Schema catalog
// =============================================================================

/// One column of a discovered table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// The engine's own type name, as reported by introspection.
    pub native_type: String,
    pub nullable: bool,
}

/// A discovered table with columns in ordinal order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub description: Option<String>,
    pub columns: Vec<ColumnSchema>,
}

/// Normalized schema snapshot of one database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub database: String,
    pub engine: EngineKind,
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Render the catalog as plain text for a generation prompt.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        for table in &self.tables {
            lines.push(format!("Table: {}", table.name));
            if let Some(ref description) = table.description {
                lines.push(format!("  Description: {}", description));
            }
            lines.push("  Columns:".to_string());
            for col in &table.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                lines.push(format!(
                    "    - {}: {} ({})",
                    col.name, col.native_type, nullable
                ));
            }
        }
        lines.join("\n")
    }
}

// =============================================================================
// Query results
// =============================================================================

/// A single cell of a result row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Column type implied by this value, `None` for NULL.
    pub fn implied_type(&self) -> Option<ColumnType> {
        match self {
            CellValue::Null => None,
            CellValue::Integer(_) => Some(ColumnType::Integer),
            CellValue::Float(_) => Some(ColumnType::Float),
            CellValue::Boolean(_) => Some(ColumnType::Boolean),
            CellValue::Text(_) => Some(ColumnType::String),
            CellValue::Blob(_) => Some(ColumnType::Other),
        }
    }
}

/// Name and normalized type of a result column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Tabular result of an executed query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    pub execution_time_ms: f64,
    /// True if the row cap cut the result short.
    pub truncated: bool,
}

impl QueryResult {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Narrative description of a query result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub data_quality_notes: Vec<String>,
}

impl ResultSummary {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Where an exported document ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub backend_kind: BackendKind,
    pub canonical_url: String,
    /// Backend-specific identifier (object key, Drive file id, absolute path).
    pub raw_id: String,
    /// Object path requested from the backend.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("postgresql".parse::<EngineKind>().unwrap(), EngineKind::Postgresql);
        assert_eq!("Postgres".parse::<EngineKind>().unwrap(), EngineKind::Postgresql);
        assert_eq!(" MYSQL ".parse::<EngineKind>().unwrap(), EngineKind::Mysql);
        assert_eq!("sqlite".parse::<EngineKind>().unwrap(), EngineKind::Sqlite);
        assert!("oracle".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_engine_kind_display_roundtrip() {
        for kind in [EngineKind::Postgresql, EngineKind::Mysql, EngineKind::Sqlite] {
            assert_eq!(kind.to_string().parse::<EngineKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_backend_kind_parse_and_display() {
        for (text, kind) in [
            ("gdrive", BackendKind::Gdrive),
            ("s3", BackendKind::S3),
            ("local", BackendKind::Local),
            ("azure", BackendKind::Azure),
            ("gcs", BackendKind::Gcs),
        ] {
            assert_eq!(text.parse::<BackendKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), text);
        }
        assert!("dropbox".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_postgres_types() {
        let pg = EngineKind::Postgresql;
        assert_eq!(ColumnType::from_native(pg, "integer"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(pg, "bigint"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(pg, "double precision"), ColumnType::Float);
        assert_eq!(ColumnType::from_native(pg, "numeric(12,2)"), ColumnType::Float);
        assert_eq!(ColumnType::from_native(pg, "character varying"), ColumnType::String);
        assert_eq!(ColumnType::from_native(pg, "boolean"), ColumnType::Boolean);
        assert_eq!(
            ColumnType::from_native(pg, "timestamp with time zone"),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::from_native(pg, "jsonb"), ColumnType::Other);
        assert_eq!(ColumnType::from_native(pg, "ARRAY"), ColumnType::Other);
    }

    #[test]
    fn test_mysql_types() {
        let my = EngineKind::Mysql;
        assert_eq!(ColumnType::from_native(my, "int(11) unsigned"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(my, "tinyint(1)"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_native(my, "tinyint(4)"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(my, "varchar(255)"), ColumnType::String);
        assert_eq!(ColumnType::from_native(my, "datetime"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_native(my, "decimal(10,2)"), ColumnType::Float);
        assert_eq!(ColumnType::from_native(my, "geometry"), ColumnType::Other);
    }

    #[test]
    fn test_sqlite_affinity_fallback() {
        let lite = EngineKind::Sqlite;
        assert_eq!(ColumnType::from_native(lite, "INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(lite, "UNSIGNED BIG INT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(lite, "VARYING CHARACTER(20)"), ColumnType::String);
        assert_eq!(ColumnType::from_native(lite, "DOUBLE"), ColumnType::Float);
        // SQLite's documented quirk: "POINT" contains "INT".
        assert_eq!(ColumnType::from_native(lite, "FLOATING POINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native(lite, ""), ColumnType::Other);
        assert_eq!(ColumnType::from_native(lite, "BLOB"), ColumnType::Other);
    }

    #[test]
    fn test_affinity_rules_do_not_apply_to_other_engines() {
        assert_eq!(
            ColumnType::from_native(EngineKind::Postgresql, "interval"),
            ColumnType::Other
        );
        // "interval" contains "int" but is not an integer outside SQLite.
        assert_eq!(
            ColumnType::from_native(EngineKind::Sqlite, "interval"),
            ColumnType::Integer
        );
    }

    #[test]
    fn test_column_type_display_parse() {
        for t in [
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::String,
            ColumnType::Boolean,
            ColumnType::Timestamp,
            ColumnType::Other,
        ] {
            assert_eq!(t.to_string().parse::<ColumnType>().unwrap(), t);
        }
    }

    #[test]
    fn test_describe_catalog() {
        let catalog = SchemaCatalog {
            database: "shop".to_string(),
            engine: EngineKind::Sqlite,
            tables: vec![TableSchema {
                name: "sales".to_string(),
                description: None,
                columns: vec![
                    ColumnSchema {
                        name: "customer_name".to_string(),
                        column_type: ColumnType::String,
                        native_type: "TEXT".to_string(),
                        nullable: true,
                    },
                    ColumnSchema {
                        name: "revenue".to_string(),
                        column_type: ColumnType::Float,
                        native_type: "REAL".to_string(),
                        nullable: false,
                    },
                ],
            }],
        };
        let text = catalog.describe();
        assert!(text.starts_with("Table: sales"));
        assert!(text.contains("    - customer_name: TEXT (NULL)"));
        assert!(text.contains("    - revenue: REAL (NOT NULL)"));
        assert!(catalog.table("sales").is_some());
        assert!(catalog.table("missing").is_none());
    }

    #[test]
    fn test_implied_type() {
        assert_eq!(CellValue::Null.implied_type(), None);
        assert_eq!(CellValue::Integer(1).implied_type(), Some(ColumnType::Integer));
        assert_eq!(CellValue::Float(1.5).implied_type(), Some(ColumnType::Float));
        assert_eq!(
            CellValue::Text("a".into()).implied_type(),
            Some(ColumnType::String)
        );
        assert_eq!(CellValue::Blob(vec![1]).implied_type(), Some(ColumnType::Other));
    }
}
