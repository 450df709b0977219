//! Transaction-per-call statement execution.
//!
//! Each call checks a connection out of the pool, opens a transaction,
//! runs exactly one statement and either commits or rolls back before the
//! connection goes back. A failed statement therefore never leaves an
//! aborted transaction behind for the next request.

use super::values::decode_row;
use crate::error::{MedSqlError, sanitize_message};
use crate::models::{BindValue, ExecutionOutcome, QueryMode};
use crate::Result;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Postgres, Statement, Transaction};

pub(crate) async fn execute_in_transaction(
    pool: &PgPool,
    sql: &str,
    args: &[BindValue],
    mode: QueryMode,
) -> Result<ExecutionOutcome> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| MedSqlError::connection_context("Failed to acquire a pooled connection", e))?;

    match run_statement(&mut tx, sql, args, mode).await {
        Ok(outcome) => {
            tx.commit().await.map_err(execution_error)?;
            Ok(outcome)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                // Dropping the connection discards the aborted session
                tracing::warn!(
                    "Rollback failed, connection will be discarded: {}",
                    sanitize_message(&rollback_error.to_string())
                );
            }
            Err(error)
        }
    }
}

async fn run_statement(
    tx: &mut Transaction<'_, Postgres>,
    sql: &str,
    args: &[BindValue],
    mode: QueryMode,
) -> Result<ExecutionOutcome> {
    if mode.is_read_only() {
        (&mut **tx)
            .execute("SET TRANSACTION READ ONLY")
            .await
            .map_err(execution_error)?;
    }

    // Preparing rejects multi-statement text and reports whether the
    // statement yields a result set before anything runs.
    let statement = (&mut **tx).prepare(sql).await.map_err(execution_error)?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    let query = bind_all(statement.query(), args);

    if columns.is_empty() {
        let result = query.execute(&mut **tx).await.map_err(execution_error)?;
        return Ok(ExecutionOutcome::Acknowledgement {
            rows_affected: result.rows_affected(),
        });
    }

    let rows: Vec<PgRow> = query.fetch_all(&mut **tx).await.map_err(execution_error)?;
    let rows = rows.iter().map(decode_row).collect();

    Ok(ExecutionOutcome::Rows { columns, rows })
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            BindValue::Text(value) => query.bind(value.clone()),
            BindValue::Int(value) => query.bind(*value),
            BindValue::Date(value) => query.bind(*value),
        };
    }
    query
}

/// Maps a driver error to a sanitized execution error.
///
/// Server-side errors keep only the server message; everything else uses
/// the driver's description.
fn execution_error(error: sqlx::Error) -> MedSqlError {
    let message = match &error {
        sqlx::Error::Database(db_error) => db_error.message().to_string(),
        other => other.to_string(),
    };
    MedSqlError::query_failed(sanitize_message(&message))
}
