//! Configuration types for the connection pool, the generation client and
//! the pipeline itself.

mod connection;
mod generator;
mod settings;

pub use connection::ConnectionConfig;
pub use generator::{GeneratorConfig, PLACEHOLDER_API_KEY, Provider};
pub use settings::PipelineSettings;

use crate::prompt::PromptConfig;
use crate::validator::ValidatorPolicy;

/// Settings shared by every request a [`QueryPipeline`](crate::QueryPipeline) serves.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Catalog namespace to introspect
    pub namespace: String,
    pub prompt: PromptConfig,
    pub validator: ValidatorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            namespace: "public".to_string(),
            prompt: PromptConfig::default(),
            validator: ValidatorPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorPolicy) -> Self {
        self.validator = validator;
        self
    }

    /// Validates the pipeline settings.
    ///
    /// # Errors
    /// Returns a configuration error for an empty namespace or a zero row cap.
    pub fn validate(&self) -> crate::Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(crate::MedSqlError::configuration(
                "schema namespace cannot be empty",
            ));
        }
        if self.prompt.row_cap == 0 {
            return Err(crate::MedSqlError::configuration(
                "row cap must be greater than 0",
            ));
        }
        Ok(())
    }
}
