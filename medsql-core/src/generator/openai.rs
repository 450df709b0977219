//! OpenAI-compatible `chat/completions` provider.

use super::{TextGenerator, http_client, send_json};
use crate::config::GeneratorConfig;
use crate::error::{GenerationError, MedSqlError};
use async_trait::async_trait;
use serde_json::{Value, json};
use zeroize::Zeroizing;

const SYSTEM_MESSAGE: &str =
    "You translate questions about hospital data into SQL. Reply with the SQL statement only.";

/// Works with any server exposing the OpenAI chat completions API.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Zeroizing<String>,
    model: String,
    temperature: Option<f32>,
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiGenerator {
    /// # Errors
    /// Returns a configuration error when no usable API key is configured.
    pub fn new(config: &GeneratorConfig) -> crate::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            MedSqlError::configuration("OpenAI API key is not configured (set OPENAI_API_KEY)")
        })?;

        Ok(Self {
            client: http_client(config.timeout)?,
            endpoint: format!("{}/chat/completions", config.effective_base_url()),
            api_key: Zeroizing::new(api_key.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_MESSAGE },
                { "role": "user", "content": prompt }
            ]
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

fn extract_text(response: &Value) -> Result<String, GenerationError> {
    let content = response["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| GenerationError::malformed_output("No content in completion response"))?;

    if content.trim().is_empty() {
        return Err(GenerationError::malformed_output(
            "Completion contained no text",
        ));
    }
    Ok(content.to_string())
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.as_str())
            .json(&self.request_body(prompt));

        let response = send_json(request).await?;
        extract_text(&response)
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
