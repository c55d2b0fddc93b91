//! NewBing (Copilot) via the cookie-authenticated ChatHub protocol.
//!
//! Each answer runs on a fresh copy of the shared session: the stored cookies
//! plus a random `X-Forwarded-For` drawn from the [`IpPool`]. A new
//! conversation is created over HTTP, then the prompt is submitted over the
//! ChatHub WebSocket, where records are JSON objects terminated by `\x1e`.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, trace, warn};

use chatai_core::config::NewBingConfig;

use crate::image::FetchedImage;
use crate::ip_pool::IpPool;
use crate::registry::{resolve_api_base, resolve_model, ProviderKind};
use crate::traits::{ChatProvider, ProviderError};

const PROVIDER: &str = "NewBing";
const RECORD_SEPARATOR: char = '\u{1e}';
const DEFAULT_WSS_URL: &str = "wss://sydney.bing.com/sydney/ChatHub";
const SIGNATURE_HEADER: &str = "x-sydney-encryptedconversationsignature";

static CITATIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\^\d+\^\)|\[\^[^\]]*\^\]").expect("citation regex"));

/// Remove `(^1^)` and `[^1^]` style citation markers.
pub fn strip_citations(text: &str) -> String {
    CITATIONS.replace_all(text, "").into_owned()
}

/// Build the `Cookie` header from the configured token.
///
/// A bare value is the `_U` cookie; anything containing `=` is taken as a
/// full cookie string.
pub fn cookie_header(token: &str) -> String {
    let token = token.trim();
    if token.contains('=') {
        token.to_string()
    } else {
        format!("_U={token}")
    }
}

fn options_sets(style: &str) -> Vec<&'static str> {
    let mut sets = vec![
        "nlu_direct_response_filter",
        "deepleo",
        "disable_emoji_spoken_text",
        "responsible_ai_policy_235",
        "enablemm",
        "dv3sugg",
        "iyxapbing",
        "iycapbing",
        "saharagenconv5",
    ];
    match style.to_ascii_lowercase().as_str() {
        "creative" => sets.extend(["h3imaginative", "clgalileo", "gencontentv3"]),
        "precise" => sets.extend(["h3precise", "clgalileo", "gencontentv3"]),
        _ => sets.push("galileo"),
    }
    sets
}

// ─────────────────────────────────────────────
// Session / conversation
// ─────────────────────────────────────────────

/// Cookies and endpoints shared by every request.
#[derive(Clone, Debug)]
pub struct BingSession {
    cookies: String,
    api_base: String,
    wss_url: String,
    forwarded_for: Option<String>,
}

impl BingSession {
    pub fn new(cookies: String, api_base: String, wss_url: String) -> Self {
        Self {
            cookies,
            api_base,
            wss_url,
            forwarded_for: None,
        }
    }

    pub fn set_forwarded_for(&mut self, addr: impl ToString) {
        self.forwarded_for = Some(addr.to_string());
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.cookies) {
            headers.insert(COOKIE, v);
        } else {
            warn!(provider = PROVIDER, "Cookie is not a valid header value");
        }
        if let Some(Ok(v)) = self.forwarded_for.as_deref().map(HeaderValue::from_str) {
            headers.insert("x-forwarded-for", v);
        }
        headers
    }
}

/// A freshly created conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub conversation_id: String,
    pub client_id: String,
    pub signature: Option<String>,
    pub encrypted_signature: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    conversation_signature: Option<String>,
    #[serde(default)]
    result: Option<CreateResult>,
}

#[derive(Deserialize)]
struct CreateResult {
    #[serde(default)]
    value: String,
    #[serde(default)]
    message: Option<String>,
}

// ─────────────────────────────────────────────
// ChatHub frames
// ─────────────────────────────────────────────

/// What a single ChatHub record means for the exchange.
#[derive(Debug, PartialEq, Eq)]
pub enum HubEvent {
    /// Streaming update carrying the bot text so far.
    Update(String),
    /// Final result: the bot text, or the service's error.
    Done(Result<String, String>),
    /// Server closed the invocation.
    Close,
    /// Keep-alive; must be answered.
    Ping,
    Other,
}

/// Split a WebSocket payload into its `\x1e`-terminated records.
pub fn split_records(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|r| !r.is_empty())
}

fn bot_text(messages: Option<&Value>) -> Option<String> {
    messages?
        .as_array()?
        .iter()
        .filter(|m| m.get("author").and_then(Value::as_str) == Some("bot"))
        .filter(|m| m.get("messageType").is_none())
        .filter_map(|m| m.get("text").and_then(Value::as_str))
        .last()
        .map(String::from)
}

pub fn parse_record(record: &str) -> HubEvent {
    let value: Value = match serde_json::from_str(record) {
        Ok(v) => v,
        Err(e) => {
            debug!(provider = PROVIDER, error = %e, "Unparseable ChatHub record");
            return HubEvent::Other;
        }
    };

    match value.get("type").and_then(Value::as_i64) {
        Some(1) => {
            let messages = value.pointer("/arguments/0/messages");
            match bot_text(messages) {
                Some(text) => HubEvent::Update(text),
                None => HubEvent::Other,
            }
        }
        Some(2) => {
            let result = value.pointer("/item/result");
            let status = result
                .and_then(|r| r.get("value"))
                .and_then(Value::as_str)
                .unwrap_or("Success");
            if status != "Success" {
                let message = result
                    .and_then(|r| r.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or(status);
                return HubEvent::Done(Err(format!("{status}: {message}")));
            }
            let text = bot_text(value.pointer("/item/messages")).unwrap_or_default();
            HubEvent::Done(Ok(text))
        }
        Some(3) => HubEvent::Close,
        Some(6) => HubEvent::Ping,
        _ => HubEvent::Other,
    }
}

fn invocation(conversation: &Conversation, style: &str, prompt: &str) -> String {
    let frame = json!({
        "arguments": [{
            "source": "cib",
            "optionsSets": options_sets(style),
            "allowedMessageTypes": ["Chat", "InternalSearchQuery", "Disengaged", "SearchQuery"],
            "isStartOfSession": true,
            "message": {
                "author": "user",
                "inputMethod": "Keyboard",
                "text": prompt,
                "messageType": "Chat",
            },
            "conversationSignature": conversation.signature,
            "conversationId": conversation.conversation_id,
            "participant": {"id": conversation.client_id},
            "tone": style,
        }],
        "invocationId": "0",
        "target": "chat",
        "type": 4,
    });
    format!("{frame}{RECORD_SEPARATOR}")
}

fn record(value: Value) -> WsMessage {
    WsMessage::text(format!("{value}{RECORD_SEPARATOR}"))
}

// ─────────────────────────────────────────────
// NewBingProvider
// ─────────────────────────────────────────────

pub struct NewBingProvider {
    client: reqwest::Client,
    session: BingSession,
    style: String,
    ip_pool: IpPool,
}

impl NewBingProvider {
    pub fn new(config: &NewBingConfig, ip_pool: IpPool) -> Self {
        let spec = ProviderKind::NewBing.spec();
        let wss_url = config
            .wss_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_WSS_URL)
            .to_string();
        Self {
            client: crate::http_client(Duration::from_secs(120)),
            session: BingSession::new(
                cookie_header(&config.token),
                resolve_api_base(config.api_base.as_deref(), spec),
                wss_url,
            ),
            style: resolve_model(&config.model, spec),
            ip_pool,
        }
    }

    fn fail(stage: &'static str, err: impl std::fmt::Display) -> ProviderError {
        let err = ProviderError::Protocol {
            provider: PROVIDER,
            stage,
            message: err.to_string(),
        };
        error!(provider = PROVIDER, error = %err, "NewBing request failed");
        err
    }

    /// Create a new conversation for `session`.
    pub async fn new_conversation(&self, session: &BingSession) -> Result<Conversation, ProviderError> {
        const STAGE: &str = "new conversation";
        let url = format!("{}/turing/conversation/create", session.api_base);

        let response = self
            .client
            .get(&url)
            .headers(session.headers())
            .send()
            .await
            .map_err(|e| Self::fail(STAGE, e))?;

        let status = response.status();
        let encrypted_signature = response
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        if !status.is_success() {
            return Err(Self::fail(STAGE, format!("status {}", status.as_u16())));
        }

        let body: CreateResponse = response.json().await.map_err(|e| Self::fail(STAGE, e))?;
        if let Some(result) = body.result.as_ref() {
            if result.value != "Success" {
                let message = result.message.as_deref().unwrap_or(&result.value);
                return Err(Self::fail(STAGE, format!("{}: {}", result.value, message)));
            }
        }
        if body.conversation_id.is_empty() {
            return Err(Self::fail(STAGE, "missing conversationId"));
        }

        Ok(Conversation {
            conversation_id: body.conversation_id,
            client_id: body.client_id,
            signature: body.conversation_signature,
            encrypted_signature,
        })
    }

    /// Submit `prompt` to an existing conversation and wait for the final text.
    pub async fn chat(
        &self,
        session: &BingSession,
        conversation: &Conversation,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        const STAGE: &str = "chat";

        let mut url = reqwest::Url::parse(&session.wss_url).map_err(|e| Self::fail(STAGE, e))?;
        if let Some(sig) = &conversation.encrypted_signature {
            url.query_pairs_mut().append_pair("sec_access_token", sig);
        }
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Self::fail(STAGE, e))?;
        request.headers_mut().extend(session.headers());

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Self::fail(STAGE, e))?;
        let (mut write, mut read) = ws.split();

        write
            .send(record(json!({"protocol": "json", "version": 1})))
            .await
            .map_err(|e| Self::fail(STAGE, e))?;

        let mut handshake_done = false;
        let mut latest = String::new();

        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| Self::fail(STAGE, e))?;
            let payload = match frame {
                WsMessage::Text(t) => t.to_string(),
                WsMessage::Close(_) => break,
                _ => continue,
            };

            for rec in split_records(&payload) {
                trace!(provider = PROVIDER, record = %rec, "ChatHub record");
                if !handshake_done {
                    // First record is the empty handshake ack.
                    handshake_done = true;
                    write
                        .send(record(json!({"type": 6})))
                        .await
                        .map_err(|e| Self::fail(STAGE, e))?;
                    write
                        .send(WsMessage::text(invocation(conversation, &self.style, prompt)))
                        .await
                        .map_err(|e| Self::fail(STAGE, e))?;
                    continue;
                }
                match parse_record(rec) {
                    HubEvent::Update(text) => latest = text,
                    HubEvent::Done(Ok(text)) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(if text.is_empty() { latest } else { text });
                    }
                    HubEvent::Done(Err(message)) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Err(Self::fail(STAGE, message));
                    }
                    HubEvent::Close => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(latest);
                    }
                    HubEvent::Ping => {
                        write
                            .send(record(json!({"type": 6})))
                            .await
                            .map_err(|e| Self::fail(STAGE, e))?;
                    }
                    HubEvent::Other => {}
                }
            }
        }

        if latest.is_empty() {
            Err(Self::fail(STAGE, "connection closed before an answer arrived"))
        } else {
            Ok(latest)
        }
    }
}

#[async_trait]
impl ChatProvider for NewBingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NewBing
    }

    fn model(&self) -> &str {
        &self.style
    }

    async fn answer(&self, prompt: &str, _images: &[FetchedImage]) -> Result<String, ProviderError> {
        let mut session = self.session.clone();
        let addr = self.ip_pool.random_address();
        session.set_forwarded_for(addr);
        debug!(provider = PROVIDER, style = %self.style, forwarded_for = %addr, "Calling NewBing");

        let conversation = self.new_conversation(&session).await?;
        let text = self.chat(&session, &conversation, prompt).await?;

        Ok(format!("{}: {}", self.style, strip_citations(&text)))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
