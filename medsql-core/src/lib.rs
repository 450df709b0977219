//! Core pipeline and utilities for MedSQL.
//!
//! This crate turns free-text questions about hospital data into SQL,
//! checks every candidate statement against a safety gate, executes it
//! transactionally and normalizes the result for transport. The HTTP server
//! and the command-line shell are thin layers over [`pipeline::QueryPipeline`].
//!
//! # Pipeline
//! 1. [`schema::SchemaIntrospector`] reads the catalog (cached by [`schema::SchemaCache`])
//! 2. [`prompt::PromptBuilder`] composes a deterministic generation request
//! 3. [`generator::SqlGenerator`] calls the text-generation service
//! 4. [`validator::SqlValidator`] enforces the request's [`models::QueryMode`]
//! 5. [`executor::QueryExecutor`] runs the statement in its own transaction
//! 6. [`serializer::ResultSerializer`] converts native values into JSON
//!
//! # Security Guarantees
//! - Read-mode requests never execute a mutating statement
//! - Every request gets its own pooled connection and transaction
//! - Connection URLs and API keys are redacted from every message

pub mod adapters;
pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod reports;
pub mod schema;
pub mod security;
pub mod serializer;
pub mod validator;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use adapters::{DatabaseAdapter, create_adapter};
pub use config::{ConnectionConfig, GeneratorConfig, PipelineConfig, PipelineSettings, Provider};
pub use error::{GenerationError, GenerationErrorKind, MedSqlError, Result, SchemaFetchError};
pub use executor::QueryExecutor;
pub use generator::{SqlGenerator, TextGenerator, create_generator};
pub use models::{
    BindValue, ColumnInfo, ExecutionOutcome, FailureKind, GeneratedStatement, QueryMode,
    QueryRequest, ScalarValue, SchemaSnapshot, TableSchema,
};
pub use pipeline::{PipelineError, PipelineReport, PipelineResponse, QueryPipeline};
pub use prompt::{PromptBuilder, PromptConfig};
pub use reports::{ReportKind, ReportParams};
pub use schema::{SchemaCache, SchemaIntrospector};
pub use serializer::ResultSerializer;
pub use validator::{DenialReason, SqlValidator, ValidationVerdict, ValidatorPolicy};
