//! SQL generation through an external text-generation service.
//!
//! The service is modeled as the [`TextGenerator`] capability so providers
//! can be swapped without touching the pipeline. [`SqlGenerator`] wraps a
//! provider and turns its raw answer into a [`GeneratedStatement`].
//!
//! Generation never retries: quota and rate-limit failures are terminal for
//! the current request and are reported with their own
//! [`GenerationErrorKind`](crate::GenerationErrorKind).

mod gemini;
mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use crate::config::{GeneratorConfig, Provider};
use crate::error::{GenerationError, MedSqlError, sanitize_message};
use crate::models::{GeneratedStatement, QueryRequest};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// A text-generation provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one prompt and returns the raw text answer.
    ///
    /// # Errors
    /// Returns `GenerationError` classified as quota, network or malformed output.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Provider name reported by health checks.
    fn provider(&self) -> &str;

    /// Model name reported by health checks.
    fn model(&self) -> &str;
}

/// Extracts a candidate statement from a provider's answer.
#[derive(Clone)]
pub struct SqlGenerator {
    inner: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for SqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGenerator")
            .field("provider", &self.inner.provider())
            .field("model", &self.inner.model())
            .finish()
    }
}

impl SqlGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>) -> Self {
        Self { inner }
    }

    pub fn provider(&self) -> &str {
        self.inner.provider()
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    /// Generates the candidate statement for `request`.
    ///
    /// # Errors
    /// Propagates provider failures and reports an answer that is empty
    /// after fence stripping as `MalformedOutput`.
    pub async fn generate(
        &self,
        prompt: &str,
        request: &QueryRequest,
    ) -> Result<GeneratedStatement, GenerationError> {
        let raw = self.inner.generate(prompt).await?;
        let sql_text = sanitize_generated_sql(&raw);
        if sql_text.is_empty() {
            return Err(GenerationError::malformed_output(
                "generation service returned no SQL",
            ));
        }

        Ok(GeneratedStatement {
            sql_text,
            source_request: request.clone(),
        })
    }
}

/// Fence regexes. An optional language tag counts only when followed by a newline.
struct FencePatterns {
    block: Option<Regex>,
    marker: Option<Regex>,
}

fn fence_patterns() -> &'static FencePatterns {
    static PATTERNS: OnceLock<FencePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FencePatterns {
        block: Regex::new(r"(?s)```(?:[A-Za-z]+[ \t]*\r?\n)?(.*?)```").ok(),
        marker: Regex::new(r"```(?:[A-Za-z]+[ \t]*\r?\n)?").ok(),
    })
}

/// Trims the answer and removes markdown code fences.
///
/// When the answer contains a closed fenced block only that block's body
/// is kept; otherwise stray fence markers are removed.
///
/// # Example
/// ```rust
/// use medsql_core::generator::sanitize_generated_sql;
///
/// assert_eq!(sanitize_generated_sql("```sql\nSELECT 1;\n```"), "SELECT 1;");
/// assert_eq!(sanitize_generated_sql("  SELECT 1  "), "SELECT 1");
/// ```
pub fn sanitize_generated_sql(raw: &str) -> String {
    let patterns = fence_patterns();
    let trimmed = raw.trim();

    let block = patterns
        .block
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().to_string());

    let body = match (block, &patterns.marker) {
        (Some(block), _) => block,
        (None, Some(marker)) => marker.replace_all(trimmed, "").into_owned(),
        (None, None) => trimmed.replace("```sql", "").replace("```", ""),
    };

    body.trim().to_string()
}

/// Builds the provider selected by `config`.
///
/// # Errors
/// Returns a configuration error for a missing or placeholder API key or an
/// invalid setting.
pub fn create_generator(config: &GeneratorConfig) -> crate::Result<Arc<dyn TextGenerator>> {
    config.validate()?;
    let generator: Arc<dyn TextGenerator> = match config.provider {
        Provider::Gemini => Arc::new(GeminiGenerator::new(config)?),
        Provider::OpenAi => Arc::new(OpenAiGenerator::new(config)?),
    };
    tracing::debug!(
        "Using {} generation provider with model {}",
        generator.provider(),
        generator.model()
    );
    Ok(generator)
}

fn http_client(timeout: Duration) -> crate::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MedSqlError::configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Classifies a transport-level failure.
fn transport_error(error: &reqwest::Error) -> GenerationError {
    let message = sanitize_message(&error.to_string());
    if error.is_decode() {
        GenerationError::malformed_output(message)
    } else {
        GenerationError::network(message)
    }
}

/// Classifies a non-success HTTP answer.
fn status_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
    let snippet: String = body.chars().take(300).collect();
    let message = sanitize_message(&format!("HTTP {}: {}", status.as_u16(), snippet.trim()));

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        GenerationError::quota_exceeded(message)
    } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
        GenerationError::network(message)
    } else {
        GenerationError::malformed_output(message)
    }
}

/// Sends a prepared request and returns the decoded JSON body.
async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, GenerationError> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| transport_error(&e))?;

    if !status.is_success() {
        return Err(status_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        GenerationError::malformed_output(format!("Response body is not JSON: {}", e))
    })
}
