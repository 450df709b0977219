//! Core data models shared by every pipeline stage.
//!
//! Everything here is request-scoped except [`SchemaSnapshot`], which is
//! built once, shared behind an `Arc` and replaced wholesale on refresh.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Column descriptor as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "column")]
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Creates a column descriptor.
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        nullable: bool,
        default: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable,
            default,
        }
    }
}

/// A base table and its columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Normalized description of the working namespace.
///
/// Tables keep catalog order and columns keep ordinal order. Serializes as a
/// JSON object keyed by table name whose values are column descriptor arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    /// Creates a snapshot from already grouped tables.
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// The degraded snapshot used when the catalog cannot be read.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from flat `(table, column)` catalog rows.
    ///
    /// Rows are expected in table then ordinal order; a table seen again
    /// later has its columns appended to the first occurrence.
    pub fn from_catalog_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, ColumnInfo)>,
    {
        let mut tables: Vec<TableSchema> = Vec::new();
        for (table_name, column) in rows {
            match tables.last_mut() {
                Some(last) if last.name == table_name => last.columns.push(column),
                _ => {
                    if let Some(existing) = tables.iter_mut().find(|t| t.name == table_name) {
                        existing.columns.push(column);
                    } else {
                        tables.push(TableSchema {
                            name: table_name,
                            columns: vec![column],
                        });
                    }
                }
            }
        }
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Looks up a table by exact name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}

impl Serialize for SchemaSnapshot {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for table in &self.tables {
            map.serialize_entry(&table.name, &table.columns)?;
        }
        map.end()
    }
}

/// Safety mode selected per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryMode {
    /// Only a single `SELECT` may run
    #[default]
    #[serde(rename = "read", alias = "readonly", alias = "read_only")]
    ReadOnly,
    /// `SELECT`, `INSERT`, `UPDATE` and `DELETE` may run
    #[serde(rename = "readwrite", alias = "read_write", alias = "write")]
    ReadWrite,
}

impl QueryMode {
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read"),
            Self::ReadWrite => write!(f, "readwrite"),
        }
    }
}

impl std::str::FromStr for QueryMode {
    type Err = crate::MedSqlError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "readonly" | "read_only" | "read-only" => Ok(Self::ReadOnly),
            "readwrite" | "read_write" | "read-write" | "write" => Ok(Self::ReadWrite),
            other => Err(crate::MedSqlError::configuration(format!(
                "Unknown mode '{}': expected 'read' or 'readwrite'",
                other
            ))),
        }
    }
}

/// A free-text question together with its safety mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "query", default)]
    pub text: String,
    #[serde(default)]
    pub mode: QueryMode,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            text: text.into(),
            mode,
        }
    }

    pub fn read(text: impl Into<String>) -> Self {
        Self::new(text, QueryMode::ReadOnly)
    }

    pub fn read_write(text: impl Into<String>) -> Self {
        Self::new(text, QueryMode::ReadWrite)
    }
}

/// Candidate SQL produced for a request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStatement {
    pub sql_text: String,
    pub source_request: QueryRequest,
}

/// A single decoded database value.
///
/// The executor maps every column type it can read into one of these
/// variants, so serialization never encounters an unknown shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision number in canonical text form
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval {
        months: i32,
        days: i32,
        microseconds: i64,
    },
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    /// One-dimensional array; NULL elements are [`ScalarValue::Null`]
    Array(Vec<ScalarValue>),
    /// A column type the executor cannot decode
    Unsupported { type_name: String },
}

/// Bind parameter for predefined report statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Text(String),
    Int(i64),
    Date(NaiveDate),
}

/// Why an execution did not produce rows or an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The database rejected the statement
    ExecutionError,
    /// No pooled connection could be acquired
    ConnectionError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecutionError => write!(f, "execution error"),
            Self::ConnectionError => write!(f, "connection error"),
        }
    }
}

/// Result of running one statement. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<ScalarValue>>,
    },
    Acknowledgement {
        rows_affected: u64,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl ExecutionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Number of rows returned, or zero for non-row outcomes.
    pub fn row_count(&self) -> usize {
        match self {
            Self::Rows { rows, .. } => rows.len(),
            _ => 0,
        }
    }
}
