//! Gemini via `streamGenerateContent` (server-sent events).
//!
//! The text model answers plain prompts; the vision model is used as soon as
//! at least one image is attached. Image parts precede the text part. Safety
//! filtering is switched off for the four standard harm categories.
//!
//! Streamed chunks are concatenated. If the stream breaks off, the text
//! gathered so far is returned inside [`ProviderError::Stream`] so the user
//! still sees the partial answer followed by the error.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use chatai_core::config::GeminiConfig;

use crate::image::FetchedImage;
use crate::registry::{resolve_api_base, ProviderKind};
use crate::traits::{ChatProvider, ProviderError};

const PROVIDER: &str = "Gemini";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline { inline_data: InlineData },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StreamChunk {
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ApiError {
    code: Option<i64>,
    message: String,
}

impl StreamChunk {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

// ─────────────────────────────────────────────
// GeminiProvider
// ─────────────────────────────────────────────

pub struct GeminiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    text_model: String,
    vision_model: String,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Self {
        let spec = ProviderKind::Gemini.spec();
        let text_model = if config.model.trim().is_empty() {
            spec.default_model.to_string()
        } else {
            config.model.trim().to_string()
        };
        let vision_model = if config.vision_model.trim().is_empty() {
            "gemini-pro-vision".to_string()
        } else {
            config.vision_model.trim().to_string()
        };
        Self {
            client: crate::http_client(Duration::from_secs(120)),
            api_base: resolve_api_base(config.api_base.as_deref(), spec),
            api_key: config.api_key.clone(),
            text_model,
            vision_model,
        }
    }

    /// Model used for a request with or without images.
    pub fn model_for(&self, has_images: bool) -> &str {
        if has_images {
            &self.vision_model
        } else {
            &self.text_model
        }
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, model
        )
    }
}

fn build_request<'a>(prompt: &'a str, images: &[FetchedImage]) -> GenerateRequest<'a> {
    let mut parts: Vec<Part<'a>> = images
        .iter()
        .map(|img| Part::Inline {
            inline_data: InlineData {
                mime_type: img.kind.mime_type(),
                data: BASE64.encode(&img.data),
            },
        })
        .collect();
    parts.push(Part::Text { text: prompt });

    GenerateRequest {
        contents: [Content {
            role: "user",
            parts,
        }],
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.text_model
    }

    async fn answer(&self, prompt: &str, images: &[FetchedImage]) -> Result<String, ProviderError> {
        let model = self.model_for(!images.is_empty());
        let mut answer = format!("{model}: ");
        debug!(provider = PROVIDER, model = %model, images = images.len(), "Calling Gemini");

        let response = self
            .client
            .post(self.stream_url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt, images))
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "HTTP request failed");
                ProviderError::Stream {
                    provider: PROVIDER,
                    partial: answer.clone(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = PROVIDER, status = %status, body = %body, "API error");
            return Err(ProviderError::Stream {
                provider: PROVIDER,
                partial: answer,
                message: format!("{} {}", status.as_u16(), body.trim()),
            });
        }

        let mut stream = response.bytes_stream().eventsource();
        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    error!(provider = PROVIDER, error = %e, "SSE stream error");
                    return Err(ProviderError::Stream {
                        provider: PROVIDER,
                        partial: answer,
                        message: e.to_string(),
                    });
                }
            };
            trace!(provider = PROVIDER, data = %event.data, "SSE chunk");
            if event.data.trim().is_empty() {
                continue;
            }

            let chunk: StreamChunk = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(ProviderError::Stream {
                        provider: PROVIDER,
                        partial: answer,
                        message: format!("bad chunk: {e}"),
                    })
                }
            };
            if let Some(err) = chunk.error {
                let message = match err.code {
                    Some(code) => format!("{code} {}", err.message),
                    None => err.message,
                };
                return Err(ProviderError::Stream {
                    provider: PROVIDER,
                    partial: answer,
                    message,
                });
            }
            answer.push_str(&chunk.text());
        }

        Ok(answer)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn make_config(api_base: &str) -> GeminiConfig {
        GeminiConfig {
            enable: true,
            api_key: "g-key".into(),
            api_base: Some(api_base.to_string()),
            ..Default::default()
        }
    }

    fn sse(chunks: &[&str]) -> String {
        chunks.iter().map(|c| format!("data: {c}\r\n\r\n")).collect()
    }

    fn sse_response(body: String) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("Content-Type", "text/event-stream")
            .set_body_string(body)
    }

    #[test]
    fn test_request_shape_images_before_text() {
        let images = vec![
            FetchedImage {
                data: vec![1, 2, 3],
                kind: ImageKind::Png,
            },
            FetchedImage {
                data: vec![4, 5],
                kind: ImageKind::Jpeg,
            },
        ];
        let json = serde_json::to_value(build_request("describe", &images)).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[2]["text"], "describe");

        let safety = json["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
    }

    #[test]
    fn test_empty_prompt_still_has_text_part() {
        let json = serde_json::to_value(build_request("", &[])).unwrap();
        assert_eq!(json["contents"][0]["parts"], serde_json::json!([{"text": ""}]));
    }

    #[test]
    fn test_model_selection() {
        let provider = GeminiProvider::new(&make_config("http://localhost"));
        assert_eq!(provider.model_for(false), "gemini-pro");
        assert_eq!(provider.model_for(true), "gemini-pro-vision");
        assert_eq!(
            provider.stream_url("gemini-pro"),
            "http://localhost/models/gemini-pro:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn test_stream_chunks_are_concatenated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:streamGenerateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
            })))
            .respond_with(sse_response(sse(&[
                r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}],"role":"model"}}]}"#,
                r#"{"candidates":[{"content":{"parts":[{"text":"lo!"}],"role":"model"}}]}"#,
            ])))
            .mount(&mock_server)
            .await;

        let provider = GeminiProvider::new(&make_config(&mock_server.uri()));
        assert_eq!(provider.answer("hello", &[]).await.unwrap(), "gemini-pro: Hello!");
    }

    #[tokio::test]
    async fn test_images_use_vision_model() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-pro-vision:streamGenerateContent"))
            .respond_with(move |req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                let parts = body["contents"][0]["parts"].as_array().unwrap().len();
                sse_response(sse(&[&format!(
                    r#"{{"candidates":[{{"content":{{"parts":[{{"text":"{parts} parts"}}]}}}}]}}"#
                )]))
            })
            .mount(&mock_server)
            .await;

        let provider = GeminiProvider::new(&make_config(&mock_server.uri()));
        let image = FetchedImage {
            data: vec![0xff, 0xd8, 0xff],
            kind: ImageKind::Jpeg,
        };
        let answer = provider.answer("what is this", &[image]).await.unwrap();
        assert_eq!(answer, "gemini-pro-vision: 2 parts");
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_answer() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(sse_response(sse(&[
                r#"{"candidates":[{"content":{"parts":[{"text":"Partial "}]}}]}"#,
                r#"{"error":{"code":500,"message":"internal","status":"INTERNAL"}}"#,
            ])))
            .mount(&mock_server)
            .await;

        let provider = GeminiProvider::new(&make_config(&mock_server.uri()));
        let err = provider.answer("hello", &[]).await.unwrap_err();
        match &err {
            ProviderError::Stream { partial, .. } => assert_eq!(partial, "gemini-pro: Partial "),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "gemini-pro: Partial Gemini stream error: 500 internal"
        );
    }

    #[tokio::test]
    async fn test_http_error_is_stream_error_with_prefix() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
            .mount(&mock_server)
            .await;

        let provider = GeminiProvider::new(&make_config(&mock_server.uri()));
        let err = provider.answer("hello", &[]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "gemini-pro: Gemini stream error: 400 API key not valid"
        );
    }
}
