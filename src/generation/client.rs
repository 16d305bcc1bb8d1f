//! Generative-AI collaborators.
//!
//! The rest of the crate only sees the [`TextGenerator`] and [`ImageGenerator`]
//! traits: prompt in, text or image out, and every call may fail. [`GeminiClient`]
//! implements both against the Gemini `generateContent` REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Errors from a generation call.
#[derive(Debug)]
pub enum GenerateError {
    MissingApiKey(String),
    Http(String),
    Status(u16, String),
    EmptyResponse,
    Decode(String),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::MissingApiKey(var) => {
                write!(f, "No API key configured (set {})", var)
            }
            GenerateError::Http(e) => write!(f, "HTTP error: {}", e),
            GenerateError::Status(code, body) => {
                write!(f, "Model returned status {}: {}", code, body)
            }
            GenerateError::EmptyResponse => write!(f, "Empty response from model"),
            GenerateError::Decode(e) => write!(f, "Cannot decode model response: {}", e),
        }
    }
}

impl std::error::Error for GenerateError {}

impl From<reqwest::Error> for GenerateError {
    fn from(e: reqwest::Error) -> Self {
        GenerateError::Http(e.to_string())
    }
}

/// Schema-directed text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a JSON text answer for `prompt`, guided by a response `schema`.
    async fn generate(
        &self,
        prompt: &str,
        schema: &Value,
        system_instruction: &str,
    ) -> Result<String, GenerateError>;
}

/// Image generation. `Ok(None)` means the model answered without an image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the image as a `data:<mime>;base64,...` URL.
    async fn generate_image(&self, prompt: &str) -> Result<Option<String>, GenerateError>;
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub api_key_env: String,
    /// Transport-level ceiling; callers apply their own, shorter timeouts.
    pub request_timeout: Duration,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    settings: GeminiSettings,
}

impl GeminiClient {
    /// Build a client, reading the API key from the configured environment variable.
    pub fn from_env(settings: GeminiSettings) -> Result<Self, GenerateError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(settings, api_key)
    }

    pub fn new(settings: GeminiSettings, api_key: Option<String>) -> Result<Self, GenerateError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(GeminiClient {
            http,
            api_key,
            settings,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.api_base_url.trim_end_matches('/'),
            model
        )
    }

    async fn post(&self, model: &str, body: &Value) -> Result<Value, GenerateError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerateError::MissingApiKey(self.settings.api_key_env.clone()))?;

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status(status.as_u16(), text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GenerateError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        schema: &Value,
        system_instruction: &str,
    ) -> Result<String, GenerateError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }
        });
        let response = self.post(&self.settings.text_model, &body).await?;
        extract_text(&response).ok_or(GenerateError::EmptyResponse)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(&self, prompt: &str) -> Result<Option<String>, GenerateError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["IMAGE"] }
        });
        let response = self.post(&self.settings.image_model, &body).await?;
        Ok(extract_inline_image(&response))
    }
}

fn first_candidate_parts(response: &Value) -> Option<&Vec<Value>> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()
}

/// Concatenate the text parts of the first candidate. Blank text counts as absent.
pub fn extract_text(response: &Value) -> Option<String> {
    let text: String = first_candidate_parts(response)?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

/// First inline image of the first candidate, as a data URL.
pub fn extract_inline_image(response: &Value) -> Option<String> {
    first_candidate_parts(response)?.iter().find_map(|part| {
        let inline = part.get("inlineData")?;
        let data = inline.get("data").and_then(Value::as_str)?;
        let mime = inline
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        Some(format!("data:{};base64,{}", mime, data))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GeminiSettings {
        GeminiSettings {
            api_base_url: "https://example.invalid/".to_string(),
            text_model: "text-model".to_string(),
            image_model: "image-model".to_string(),
            api_key_env: "SUGOROKU_TEST_KEY".to_string(),
            request_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn extract_text_joins_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn extract_text_treats_blank_as_missing() {
        let response = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert_eq!(extract_text(&response), None);
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
        assert_eq!(extract_text(&json!({})), None);
    }

    #[test]
    fn extract_inline_image_builds_data_url() {
        let response = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/webp", "data": "AAAA" } }
            ] } }]
        });
        assert_eq!(
            extract_inline_image(&response).as_deref(),
            Some("data:image/webp;base64,AAAA")
        );

        let no_mime = json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "BBBB" } }] } }]
        });
        assert_eq!(
            extract_inline_image(&no_mime).as_deref(),
            Some("data:image/png;base64,BBBB")
        );
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = GeminiClient::new(settings(), None).unwrap();
        assert_eq!(
            client.endpoint("text-model"),
            "https://example.invalid/v1beta/models/text-model:generateContent"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let client = GeminiClient::new(settings(), None).unwrap();
        assert!(!client.has_api_key());
        let err = client.generate("p", &json!({}), "s").await.unwrap_err();
        assert!(matches!(err, GenerateError::MissingApiKey(_)));
        assert!(err.to_string().contains("SUGOROKU_TEST_KEY"));
    }
}
