//! Operator-facing settings shared by the server and the CLI.
//!
//! Both binaries expose the same flags; they parse them into
//! [`PipelineSettings`] and call [`PipelineSettings::build`].

use super::{GeneratorConfig, PipelineConfig, Provider};
use crate::error::MedSqlError;
use crate::pipeline::QueryPipeline;
use crate::prompt::PromptConfig;
use crate::validator::ValidatorPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything needed to assemble a [`QueryPipeline`] apart from the database URL.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub provider: Provider,
    /// Model name; `None` uses the provider default
    pub model: Option<String>,
    /// Endpoint override for the generation service
    pub generator_url: Option<String>,
    pub generator_timeout: Duration,
    /// Schema namespace to introspect
    pub schema: String,
    pub row_cap: u32,
    /// File replacing the built-in hospital table hints
    pub domain_context: Option<PathBuf>,
    pub allow_unfiltered_mutations: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            generator_url: None,
            generator_timeout: Duration::from_secs(30),
            schema: "public".to_string(),
            row_cap: 100,
            domain_context: None,
            allow_unfiltered_mutations: false,
        }
    }
}

impl PipelineSettings {
    /// Generation client config; the API key comes from the provider's
    /// environment variable.
    pub fn generator_config(&self) -> GeneratorConfig {
        let mut config =
            GeneratorConfig::from_env(self.provider).with_timeout(self.generator_timeout);
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(url) = &self.generator_url {
            config = config.with_base_url(url);
        }
        config
    }

    /// Pipeline config, reading the domain-context file if one is set.
    ///
    /// # Errors
    /// Returns an I/O error if the domain-context file cannot be read, or a
    /// configuration error if the result fails validation.
    pub fn pipeline_config(&self) -> crate::Result<PipelineConfig> {
        let domain_context = match &self.domain_context {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                MedSqlError::io(format!("Failed to read {}", path.display()), e)
            })?),
            None => PromptConfig::hospital().domain_context,
        };
        let config = PipelineConfig::default()
            .with_namespace(&self.schema)
            .with_prompt(PromptConfig {
                row_cap: self.row_cap,
                domain_context,
                ..PromptConfig::default()
            })
            .with_validator(ValidatorPolicy {
                require_where_on_mutation: !self.allow_unfiltered_mutations,
            });
        config.validate()?;
        Ok(config)
    }

    /// Connects to `database_url` and assembles the pipeline.
    ///
    /// Pool size and statement timeout come from the URL
    /// (`pool_max_conns`, `statement_timeout`, `connect_timeout`).
    ///
    /// # Errors
    /// Returns an error if the settings are invalid, the generator cannot be
    /// created, or the database is unreachable.
    pub async fn build(&self, database_url: &str) -> crate::Result<QueryPipeline> {
        let generator = crate::generator::create_generator(&self.generator_config())?;
        let config = self.pipeline_config()?;
        let adapter = crate::adapters::create_adapter(database_url).await?;
        info!(
            "Using {} adapter and {} model {}",
            adapter.engine_name(),
            generator.provider(),
            generator.model()
        );
        Ok(QueryPipeline::new(Arc::from(adapter), generator, config))
    }
}
