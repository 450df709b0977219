//! The request pipeline.
//!
//! One [`QueryPipeline`] serves every request in the process. A request
//! flows through schema lookup, prompt construction, generation,
//! validation, execution and serialization in that order; the stages share
//! nothing request-scoped, so concurrent requests never interfere.
//!
//! # Failure handling
//! - Schema fetch failures degrade to an empty schema and are reported as a warning
//! - Generation failures abort the request before anything is executed
//! - Validation never fails; rejected statements are replaced by a denial `SELECT`
//! - Execution failures are rolled back and returned inside the result

use crate::adapters::DatabaseAdapter;
use crate::config::PipelineConfig;
use crate::error::{GenerationError, GenerationErrorKind};
use crate::executor::QueryExecutor;
use crate::generator::{SqlGenerator, TextGenerator};
use crate::models::{ExecutionOutcome, QueryRequest};
use crate::prompt::PromptBuilder;
use crate::schema::{SchemaCache, SchemaIntrospector};
use crate::serializer::ResultSerializer;
use crate::validator::{SqlValidator, ValidationVerdict};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Reasons a request produced no executed statement.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request text was empty or whitespace
    #[error("Query cannot be empty")]
    EmptyQuery,

    /// The generation service failed; nothing was executed
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    /// Generation failure classification, if any.
    pub fn generation_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            Self::EmptyQuery => None,
            Self::Generation(error) => Some(error.kind()),
        }
    }

    /// Transport body: `{"error": ...}` plus the generation kind when known.
    pub fn to_body(&self) -> Value {
        match self {
            Self::EmptyQuery => json!({ "error": self.to_string() }),
            Self::Generation(error) => json!({
                "error": self.to_string(),
                "kind": error.kind(),
            }),
        }
    }
}

/// Everything that happened to one request.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub request: QueryRequest,
    pub verdict: ValidationVerdict,
    pub outcome: ExecutionOutcome,
    /// Set when the prompt was built from a degraded (empty) schema
    pub schema_warning: Option<String>,
}

impl PipelineReport {
    /// The statement that actually ran: the candidate, or the denial statement.
    pub fn executed_sql(&self) -> &str {
        self.verdict.executable_sql()
    }

    pub fn result(&self) -> Value {
        ResultSerializer::serialize(&self.outcome)
    }

    pub fn to_response(&self) -> PipelineResponse {
        PipelineResponse {
            query: self.request.text.clone(),
            sql: self.executed_sql().to_string(),
            result: self.result(),
            warning: self.schema_warning.clone(),
        }
    }
}

/// Transport shape of a completed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub query: String,
    pub sql: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// The six-stage natural-language-to-SQL pipeline.
#[derive(Debug, Clone)]
pub struct QueryPipeline {
    schema: Arc<SchemaCache>,
    prompt: PromptBuilder,
    generator: SqlGenerator,
    validator: SqlValidator,
    executor: QueryExecutor,
}

impl QueryPipeline {
    /// Wires the pipeline over a database adapter and a generation provider.
    pub fn new(
        adapter: Arc<dyn DatabaseAdapter>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        let introspector = SchemaIntrospector::new(Arc::clone(&adapter), config.namespace);
        Self {
            schema: Arc::new(SchemaCache::new(introspector)),
            prompt: PromptBuilder::new(config.prompt),
            generator: SqlGenerator::new(generator),
            validator: SqlValidator::new(config.validator),
            executor: QueryExecutor::new(adapter),
        }
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schema
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    /// Runs one request end to end.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmptyQuery`] for blank text and
    /// [`PipelineError::Generation`] when no candidate statement could be
    /// produced. Execution failures are not errors; they are reported in
    /// the returned outcome.
    pub async fn run(&self, request: &QueryRequest) -> Result<PipelineReport, PipelineError> {
        if request.text.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let (snapshot, schema_error) = self.schema.get().await;
        let schema_warning = schema_error.map(|e| e.to_string());
        tracing::debug!(
            "Building {} prompt over {} tables",
            request.mode,
            snapshot.table_count()
        );
        let prompt = self.prompt.build(&snapshot, request);

        let candidate = self.generator.generate(&prompt, request).await.map_err(|e| {
            tracing::warn!("Generation failed: {}", e);
            PipelineError::Generation(e)
        })?;
        tracing::debug!("Generated candidate statement: {}", candidate.sql_text);

        let verdict = self.validator.validate(candidate);
        let outcome = self
            .executor
            .execute(verdict.executable_sql(), request.mode)
            .await;

        Ok(PipelineReport {
            request: request.clone(),
            verdict,
            outcome,
            schema_warning,
        })
    }
}
