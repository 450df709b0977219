//! Text-generation service configuration.

use crate::error::MedSqlError;
use std::time::Duration;
use zeroize::Zeroizing;

/// Key value shipped in sample `.env` files; treated as "not configured".
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Supported text-generation providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Generative Language API
    #[default]
    Gemini,
    /// Any OpenAI-compatible `chat/completions` endpoint
    OpenAi,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = MedSqlError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "open-ai" => Ok(Self::OpenAi),
            other => Err(MedSqlError::configuration(format!(
                "Unsupported generation provider '{}': expected 'gemini' or 'openai'",
                other
            ))),
        }
    }
}

/// Configuration for the text-generation client.
///
/// # Security
/// The API key is held in a `Zeroizing` buffer and never appears in
/// `Debug` output or log lines.
#[derive(Clone)]
pub struct GeneratorConfig {
    pub provider: Provider,
    pub model: String,
    api_key: Option<Zeroizing<String>>,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    /// Per-call timeout
    pub timeout: Duration,
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(Provider::default())
    }
}

impl GeneratorConfig {
    /// Creates a config with the provider's default model and no key.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(30),
            temperature: None,
        }
    }

    /// Creates a config for `provider`, taking the key from its environment variable.
    pub fn from_env(provider: Provider) -> Self {
        let config = Self::new(provider);
        match std::env::var(provider.api_key_env()) {
            Ok(key) if !key.trim().is_empty() => config.with_api_key(key),
            _ => config,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Zeroizing::new(key.into()));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Returns the API key if one is configured and is not the placeholder.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(String::as_str)
            .filter(|key| !key.trim().is_empty() && *key != PLACEHOLDER_API_KEY)
    }

    /// Endpoint root with any trailing slash removed.
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    /// Validates the configuration before any client is built.
    ///
    /// # Errors
    /// Returns a configuration error for a missing or placeholder key, an
    /// empty model name, a zero timeout, an out-of-range temperature or an
    /// unparseable base URL.
    pub fn validate(&self) -> crate::Result<()> {
        if self.api_key().is_none() {
            return Err(MedSqlError::configuration(format!(
                "{} API key is not configured (set {})",
                self.provider,
                self.provider.api_key_env()
            )));
        }

        if self.model.trim().is_empty() {
            return Err(MedSqlError::configuration("model name cannot be empty"));
        }

        if self.timeout.is_zero() {
            return Err(MedSqlError::configuration(
                "generation timeout must be greater than 0",
            ));
        }

        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(MedSqlError::configuration(
                "temperature must be between 0.0 and 2.0",
            ));
        }

        if let Some(base_url) = &self.base_url {
            url::Url::parse(base_url).map_err(|e| {
                MedSqlError::configuration(format!("Invalid generation base URL: {}", e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("claude".parse::<Provider>().is_err());
        assert_eq!(Provider::OpenAi.to_string(), "openai");
    }

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.effective_base_url(),
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn test_missing_and_placeholder_keys_are_rejected() {
        let config = GeneratorConfig::new(Provider::Gemini);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));

        let config = GeneratorConfig::new(Provider::Gemini).with_api_key(PLACEHOLDER_API_KEY);
        assert!(config.api_key().is_none());
        assert!(config.validate().is_err());

        let config = GeneratorConfig::new(Provider::Gemini).with_api_key("real-key");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_bounds() {
        let base = GeneratorConfig::new(Provider::OpenAi).with_api_key("sk-test");

        assert!(base.clone().with_temperature(0.2).validate().is_ok());
        assert!(base.clone().with_temperature(3.5).validate().is_err());
        assert!(base.clone().with_timeout(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_model(" ").validate().is_err());
        assert!(base.clone().with_base_url("not a url").validate().is_err());
        assert_eq!(
            base.with_base_url("http://localhost:8080/v1/").effective_base_url(),
            "http://localhost:8080/v1"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = GeneratorConfig::new(Provider::Gemini).with_api_key("AIzaSecretValue");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("AIzaSecretValue"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_from_env_reads_provider_key() {
        temp_env::with_vars(
            [
                ("GOOGLE_API_KEY", Some("google-key")),
                ("OPENAI_API_KEY", None::<&str>),
            ],
            || {
                let gemini = GeneratorConfig::from_env(Provider::Gemini);
                assert_eq!(gemini.api_key(), Some("google-key"));

                let openai = GeneratorConfig::from_env(Provider::OpenAi);
                assert!(openai.api_key().is_none());
            },
        );
    }
}
