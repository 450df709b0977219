//! PostgreSQL database adapter with connection pooling and transactional execution.
//!
//! # Module Structure
//! - `connection`: Connection pool management and validation
//! - `introspection`: Catalog reads for the schema snapshot
//! - `execution`: Transaction-per-call statement execution
//! - `values`: Column value decoding into `ScalarValue`
//!
//! # Security Guarantees
//! - Connection strings are sanitized in error messages
//! - Statement timeouts prevent resource exhaustion
//! - Read-mode statements run in `READ ONLY` transactions

mod connection;
mod execution;
mod introspection;
mod values;


use super::DatabaseAdapter;
use crate::{
    ConnectionConfig, Result,
    error::{MedSqlError, SchemaFetchError},
    models::{BindValue, ExecutionOutcome, QueryMode, SchemaSnapshot},
};
use async_trait::async_trait;
use sqlx::PgPool;

/// PostgreSQL database adapter with connection pooling
pub struct PostgresAdapter {
    pub pool: PgPool,
    pub config: ConnectionConfig,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish()
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn test_connection(&self) -> Result<()> {
        let connectivity_result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(MedSqlError::connection_failed)?;

        if connectivity_result != 1 {
            return Err(MedSqlError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }

        // The introspector depends on information_schema being readable
        let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.tables")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                MedSqlError::connection_context("Cannot access information_schema.tables", e)
            })?;

        Ok(())
    }

    async fn fetch_schema(
        &self,
        namespace: &str,
    ) -> std::result::Result<SchemaSnapshot, SchemaFetchError> {
        introspection::fetch_schema(&self.pool, namespace).await
    }

    async fn execute_bound(
        &self,
        sql: &str,
        args: &[BindValue],
        mode: QueryMode,
    ) -> Result<ExecutionOutcome> {
        execution::execute_in_transaction(&self.pool, sql, args, mode).await
    }

    fn engine_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn connection_config(&self) -> ConnectionConfig {
        self.config.clone()
    }
}
