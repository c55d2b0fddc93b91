//! ChatGPT via any OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use chatai_core::config::ProviderConfig;

use crate::image::FetchedImage;
use crate::registry::{resolve_api_base, resolve_model, ProviderKind};
use crate::traits::{ChatProvider, ProviderError};

const PROVIDER: &str = "ChatGPT";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Single-turn ChatGPT client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let spec = ProviderKind::ChatGpt.spec();
        Self {
            client: crate::http_client(Duration::from_secs(120)),
            api_base: resolve_api_base(config.api_base.as_deref(), spec),
            api_key: config.api_key.clone(),
            model: resolve_model(&config.model, spec),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ChatGpt
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn answer(&self, prompt: &str, _images: &[FetchedImage]) -> Result<String, ProviderError> {
        debug!(provider = PROVIDER, model = %self.model, "Calling ChatGPT");

        let body = CompletionRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "HTTP request failed");
                ProviderError::network(PROVIDER, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(provider = PROVIDER, status = %status, body = %body, "API error");
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::decode(PROVIDER, "response has no choices"))?;

        Ok(format!("{}: {}", self.model, content))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
