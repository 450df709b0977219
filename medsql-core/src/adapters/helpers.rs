//! Helper utilities for database adapter implementations.
//!
//! Provides common functionality shared across the adapter and the pipeline
//! stages so that row extraction and message redaction behave consistently.

#[cfg(feature = "postgresql")]
use crate::{Result, error::MedSqlError};
#[cfg(feature = "postgresql")]
use sqlx::{Row, postgres::PgRow};
use std::sync::OnceLock;

/// Extension trait for extracting typed values from database rows
/// with consistent error handling.
///
/// # Example
/// ```rust,ignore
/// use medsql_core::adapters::helpers::RowExt;
///
/// let name: String = row.get_field("table_name", Some("information_schema.columns"))?;
/// let default: Option<String> = row.get_field("column_default", None)?;
/// ```
#[cfg(feature = "postgresql")]
pub trait RowExt {
    /// Extracts a typed field from the row with proper error context.
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>;
}

#[cfg(feature = "postgresql")]
impl RowExt for PgRow {
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        self.try_get(field_name).map_err(|e| {
            let context = match table_context {
                Some(table) => format!(
                    "Failed to parse field '{}' from result for table '{}'",
                    field_name, table
                ),
                None => format!("Failed to parse field '{}' from database result", field_name),
            };
            MedSqlError::connection_context(context, e)
        })
    }
}

/// Pre-compiled regex patterns used to keep credentials out of messages.
///
/// Uses `OnceLock` for thread-safe lazy initialization.
pub struct ValidationPatterns {
    /// Patterns matching connection URLs that may carry credentials
    pub connection_patterns: Vec<regex::Regex>,
    /// Patterns matching API keys embedded in request URLs
    pub api_key_patterns: Vec<regex::Regex>,
}

impl ValidationPatterns {
    /// Gets the singleton instance of pre-compiled validation patterns.
    pub fn instance() -> &'static Self {
        static PATTERNS: OnceLock<ValidationPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        let connection_patterns = [
            r"(?i)postgres(?:ql)?://[^\s'\x22]+",
            r"(?i)mysql://[^\s'\x22]+",
            r"(?i)mongodb(?:\+srv)?://[^\s'\x22]+",
        ]
        .iter()
        .filter_map(|pattern| regex::Regex::new(pattern).ok())
        .collect();

        let api_key_patterns = [r"(?i)([?&](?:key|api_key)=)[^&\s'\x22]+", r"(?i)(bearer\s+)\S+"]
            .iter()
            .filter_map(|pattern| regex::Regex::new(pattern).ok())
            .collect();

        Self {
            connection_patterns,
            api_key_patterns,
        }
    }

    /// Checks if a string contains connection credentials.
    pub fn contains_credentials(&self, s: &str) -> bool {
        self.connection_patterns.iter().any(|pattern| {
            pattern
                .find_iter(s)
                .any(|m| m.as_str().contains('@') && m.as_str().contains(':'))
        })
    }

    /// Replaces embedded connection URLs and API keys with redacted forms.
    pub fn redact_credentials(&self, s: &str) -> String {
        let mut redacted = s.to_string();
        for pattern in &self.connection_patterns {
            redacted = pattern
                .replace_all(&redacted, |caps: &regex::Captures<'_>| {
                    crate::error::redact_database_url(&caps[0])
                })
                .into_owned();
        }
        for pattern in &self.api_key_patterns {
            redacted = pattern.replace_all(&redacted, "${1}****").into_owned();
        }
        redacted
    }
}
