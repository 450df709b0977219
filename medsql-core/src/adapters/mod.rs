//! Database adapter trait and factory.
//!
//! The pipeline talks to the hospital database only through
//! [`DatabaseAdapter`], which keeps the introspector and the executor
//! testable without a live server and leaves room for other engines.
//!
//! # Module Structure
//! - `helpers`: Row extraction and credential redaction shared by every stage
//! - `postgres`: PostgreSQL adapter (feature `postgresql`)

use crate::{
    ConnectionConfig, Result,
    error::{MedSqlError, SchemaFetchError},
    models::{BindValue, ExecutionOutcome, QueryMode, SchemaSnapshot},
};
use async_trait::async_trait;

pub mod helpers;

#[cfg(feature = "postgresql")]
pub mod postgres;

/// Main trait for database adapters with object-safe design.
///
/// # Security Guarantees
/// - Every statement runs in its own transaction on its own pooled connection
/// - A failed transaction is rolled back before the connection is reused
/// - Connection strings are sanitized in error messages
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn DatabaseAdapter>` or `Arc<dyn DatabaseAdapter>`.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Tests the database connection and catalog access.
    ///
    /// # Errors
    /// Returns error if connection fails or times out
    async fn test_connection(&self) -> Result<()>;

    /// Reads base tables and their columns from `namespace`.
    ///
    /// Only catalog views are read. Tables come back in name order and
    /// columns in ordinal order.
    ///
    /// # Errors
    /// Returns `SchemaFetchError` if the catalog cannot be read
    async fn fetch_schema(
        &self,
        namespace: &str,
    ) -> std::result::Result<SchemaSnapshot, SchemaFetchError>;

    /// Runs one statement in a fresh transaction.
    ///
    /// # Errors
    /// `MedSqlError::Connection` when no connection can be acquired,
    /// `MedSqlError::QueryExecution` when the database rejects the statement.
    /// The transaction is rolled back in both cases.
    async fn execute(&self, sql: &str, mode: QueryMode) -> Result<ExecutionOutcome> {
        self.execute_bound(sql, &[], mode).await
    }

    /// Runs one statement with positional bind parameters in a fresh transaction.
    ///
    /// # Errors
    /// Same as [`DatabaseAdapter::execute`]
    async fn execute_bound(
        &self,
        sql: &str,
        args: &[BindValue],
        mode: QueryMode,
    ) -> Result<ExecutionOutcome>;

    /// Human-readable engine name.
    fn engine_name(&self) -> &'static str;

    /// Gets the connection configuration (credentials sanitized).
    fn connection_config(&self) -> ConnectionConfig;
}

/// Factory function to create a database adapter from a connection string.
///
/// # Arguments
/// * `connection_string` - Database connection URL (will be sanitized in errors)
///
/// # Errors
/// Returns error if:
/// - Connection string format is invalid
/// - The scheme is not supported
/// - Required features are not compiled in
pub async fn create_adapter(connection_string: &str) -> Result<Box<dyn DatabaseAdapter>> {
    let scheme = connection_string
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| {
            MedSqlError::configuration(
                "Connection string must be a URL such as postgres://host/database",
            )
        })?;

    match scheme.as_str() {
        #[cfg(feature = "postgresql")]
        "postgres" | "postgresql" => Ok(Box::new(
            postgres::PostgresAdapter::new(connection_string).await?,
        )),
        #[cfg(not(feature = "postgresql"))]
        "postgres" | "postgresql" => Err(MedSqlError::configuration(
            "PostgreSQL support is not compiled in (enable the postgresql feature)",
        )),
        other => Err(MedSqlError::configuration(format!(
            "Unsupported database scheme '{}': only postgres:// is supported",
            other
        ))),
    }
}
