//! Statement execution with per-request transactions.
//!
//! [`QueryExecutor`] never returns an error: every failure becomes an
//! [`ExecutionOutcome::Failure`] so the request can still be answered and
//! the pool stays usable for the next one.

use crate::adapters::DatabaseAdapter;
use crate::error::{MedSqlError, sanitize_message};
use crate::models::{BindValue, ExecutionOutcome, FailureKind, QueryMode};
use std::sync::Arc;

#[derive(Clone)]
pub struct QueryExecutor {
    adapter: Arc<dyn DatabaseAdapter>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("engine", &self.adapter.engine_name())
            .finish()
    }
}

impl QueryExecutor {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    /// Runs `sql` in its own transaction.
    ///
    /// Read-only mode runs the transaction `READ ONLY`, so a statement that
    /// slipped past validation still cannot write.
    pub async fn execute(&self, sql: &str, mode: QueryMode) -> ExecutionOutcome {
        self.execute_bound(sql, &[], mode).await
    }

    /// Runs `sql` with positional bind parameters.
    pub async fn execute_bound(
        &self,
        sql: &str,
        args: &[BindValue],
        mode: QueryMode,
    ) -> ExecutionOutcome {
        tracing::debug!("Executing {} statement with {} parameters", mode, args.len());

        match self.adapter.execute_bound(sql, args, mode).await {
            Ok(outcome) => {
                tracing::debug!("Statement returned {} rows", outcome.row_count());
                outcome
            }
            Err(error) => {
                let outcome = failure_outcome(&error);
                tracing::warn!("Statement failed: {}", error);
                outcome
            }
        }
    }
}

fn failure_outcome(error: &MedSqlError) -> ExecutionOutcome {
    match error {
        MedSqlError::Connection { context, .. } => ExecutionOutcome::Failure {
            kind: FailureKind::ConnectionError,
            message: sanitize_message(context),
        },
        MedSqlError::QueryExecution { context } => ExecutionOutcome::Failure {
            kind: FailureKind::ExecutionError,
            message: sanitize_message(context),
        },
        other => ExecutionOutcome::Failure {
            kind: FailureKind::ExecutionError,
            message: sanitize_message(&other.to_string()),
        },
    }
}
