//! Google Generative Language API provider.

use super::{TextGenerator, http_client, send_json};
use crate::config::GeneratorConfig;
use crate::error::{GenerationError, MedSqlError};
use async_trait::async_trait;
use serde_json::{Value, json};
use zeroize::Zeroizing;

/// Calls `models/{model}:generateContent`.
///
/// The key travels in the `x-goog-api-key` header so it never appears in
/// request URLs or transport error messages.
pub struct GeminiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Zeroizing<String>,
    model: String,
    temperature: Option<f32>,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiGenerator {
    /// # Errors
    /// Returns a configuration error when no usable API key is configured.
    pub fn new(config: &GeneratorConfig) -> crate::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            MedSqlError::configuration("Gemini API key is not configured (set GOOGLE_API_KEY)")
        })?;

        Ok(Self {
            client: http_client(config.timeout)?,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.effective_base_url(),
                config.model
            ),
            api_key: Zeroizing::new(api_key.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });
        if let Some(temperature) = self.temperature {
            body["generationConfig"] = json!({ "temperature": temperature });
        }
        body
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: &Value) -> Result<String, GenerationError> {
    if let Some(reason) = response["promptFeedback"]["blockReason"].as_str() {
        return Err(GenerationError::malformed_output(format!(
            "Prompt was blocked: {}",
            reason
        )));
    }

    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| GenerationError::malformed_output("No candidate in Gemini response"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(GenerationError::malformed_output(
            "Gemini candidate contained no text",
        ));
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&self.request_body(prompt));

        let response = send_json(request).await?;
        extract_text(&response)
    }

    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
