//! QWen via the DashScope text-generation API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use chatai_core::config::ProviderConfig;

use crate::image::FetchedImage;
use crate::registry::{resolve_api_base, resolve_model, ProviderKind};
use crate::traits::{ChatProvider, ProviderError};

const PROVIDER: &str = "QWen";

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters,
}

#[derive(Serialize)]
struct Input<'a> {
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct Parameters {
    enable_search: bool,
}

#[derive(Deserialize)]
struct GenerationResponse {
    output: Option<Output>,
}

#[derive(Deserialize)]
struct Output {
    text: Option<String>,
}

pub struct QWenProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl QWenProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let spec = ProviderKind::QWen.spec();
        Self {
            client: crate::http_client(Duration::from_secs(120)),
            api_base: resolve_api_base(config.api_base.as_deref(), spec),
            api_key: config.api_key.clone(),
            model: resolve_model(&config.model, spec),
        }
    }

    fn generation_url(&self) -> String {
        format!("{}/services/aigc/text-generation/generation", self.api_base)
    }
}

#[async_trait]
impl ChatProvider for QWenProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::QWen
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn answer(&self, prompt: &str, _images: &[FetchedImage]) -> Result<String, ProviderError> {
        debug!(provider = PROVIDER, model = %self.model, "Calling QWen");

        let body = GenerationRequest {
            model: &self.model,
            input: Input {
                messages: [Message {
                    role: "user",
                    content: prompt,
                }],
            },
            parameters: Parameters {
                enable_search: true,
            },
        };

        let response = self
            .client
            .post(self.generation_url())
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

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e))?;

        let text = parsed
            .output
            .and_then(|o| o.text)
            .ok_or_else(|| ProviderError::decode(PROVIDER, "QWen json error"))?;

        Ok(format!("{}: {}", self.model, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(api_base: &str) -> ProviderConfig {
        ProviderConfig {
            enable: true,
            args: vec!["!qwen".into()],
            model: "qwen-max".into(),
            api_key: "dash-key".into(),
            api_base: Some(api_base.to_string()),
        }
    }

    #[test]
    fn test_default_endpoint() {
        let config = ProviderConfig {
            api_key: "k".into(),
            ..Default::default()
        };
        let provider = QWenProvider::new(&config);
        assert_eq!(
            provider.generation_url(),
            "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation"
        );
        assert_eq!(provider.model(), "qwen-turbo");
    }

    #[tokio::test]
    async fn test_answer_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/services/aigc/text-generation/generation"))
            .and(header("Authorization", "Bearer dash-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen-max",
                "input": {"messages": [{"role": "user", "content": "你好"}]},
                "parameters": {"enable_search": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"text": "你好！", "finish_reason": "stop"},
                "request_id": "abc"
            })))
            .mount(&mock_server)
            .await;

        let provider = QWenProvider::new(&make_config(&mock_server.uri()));
        assert_eq!(provider.answer("你好", &[]).await.unwrap(), "qwen-max: 你好！");
    }

    #[tokio::test]
    async fn test_missing_output_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "InvalidParameter",
                "message": "bad input"
            })))
            .mount(&mock_server)
            .await;

        let provider = QWenProvider::new(&make_config(&mock_server.uri()));
        let err = provider.answer("hi", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "QWen decode error: QWen json error");
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&mock_server)
            .await;

        let provider = QWenProvider::new(&make_config(&mock_server.uri()));
        let err = provider.answer("hi", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    }
}
