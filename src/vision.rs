//! Image analysis collaborator.
//!
//! `VisionClient` is the narrow contract the meal-capture scenario depends
//! on; `OpenAiVision` implements it against the OpenAI chat-completions API
//! with an image part in the user message. References claimed by a
//! registered [`ImageSource`] are downloaded and sent inline as a `data:`
//! URL; anything else is passed to the API as a plain URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::VisionError;

/// Returned when the API answers without any choices.
pub const EMPTY_ANSWER: &str = "The vision service returned no answer";

/// Stateless single request/response image analysis. Callers do not retry.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Describe the image at `image_ref`.
    async fn analyze(&self, image_ref: &str) -> Result<String, VisionError>;
}

/// Resolves channel-specific image references to raw bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Whether this source understands `image_ref`.
    fn accepts(&self, image_ref: &str) -> bool;

    async fn fetch(&self, image_ref: &str) -> Result<Vec<u8>, VisionError>;
}

/// Configuration for [`OpenAiVision`].
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: SecretString,
    pub model: String,
    pub prompt: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// OpenAI-backed vision client.
pub struct OpenAiVision {
    config: VisionConfig,
    client: reqwest::Client,
    sources: Vec<Arc<dyn ImageSource>>,
}

impl OpenAiVision {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            sources: Vec::new(),
        })
    }

    pub fn with_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// The URL placed in the request's `image_url` part.
    async fn image_url(&self, image_ref: &str) -> Result<String, VisionError> {
        let Some(source) = self.sources.iter().find(|s| s.accepts(image_ref)) else {
            return Ok(image_ref.to_string());
        };
        let bytes = source.fetch(image_ref).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:image/jpeg;base64,{encoded}"))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, image_url: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.config.prompt },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }]
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a completion response.
fn first_choice_text(response: CompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_else(|| EMPTY_ANSWER.to_string())
}

#[async_trait]
impl VisionClient for OpenAiVision {
    async fn analyze(&self, image_ref: &str) -> Result<String, VisionError> {
        let image_url = self.image_url(image_ref).await?;
        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&self.request_body(&image_url))
            .send()
            .await
            .map_err(|e| VisionError::RequestFailed(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;
        let text = first_choice_text(parsed);
        debug!(model = %self.config.model, chars = text.len(), "Vision analysis complete");
        Ok(text)
    }
}
