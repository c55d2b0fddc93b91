//! Configuration schema.
//!
//! Hierarchy: `Config` → `OneBotConfig`, `ChatAiConfig` → one section per
//! provider.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.chatai/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub onebot: OneBotConfig,
    pub chat_ai: ChatAiConfig,
}

// ─────────────────────────────────────────────
// Platform connection
// ─────────────────────────────────────────────

/// OneBot v11 forward WebSocket connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OneBotConfig {
    /// WebSocket URL of the OneBot implementation.
    pub ws_url: String,
    /// Access token sent as `Authorization: Bearer ...`. Empty = none.
    pub access_token: String,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:6700".to_string(),
            access_token: String::new(),
        }
    }
}

// ─────────────────────────────────────────────
// ChatAI plugin
// ─────────────────────────────────────────────

/// Dispatcher settings and the four provider sections.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatAiConfig {
    /// Master switch. When false no message or echo is handled.
    pub enable: bool,
    /// Answer group messages as a two-node forwarded conversation.
    pub group_forward: bool,
    /// Insert spaces between CJK and half-width characters in answers.
    pub pan_gu: bool,
    /// Display name of the bot's node in forwarded conversations.
    pub forward_name: String,
    /// Fallback uin for forward nodes when the event carries no `self_id`.
    pub forward_uin: i64,
    /// Pending reply lifetime in seconds; 0 keeps entries until claimed.
    pub pending_reply_ttl_secs: u64,
    #[serde(rename = "chatGPT")]
    pub chat_gpt: ProviderConfig,
    #[serde(rename = "qWen")]
    pub qwen: ProviderConfig,
    pub gemini: GeminiConfig,
    pub new_bing: NewBingConfig,
}

impl Default for ChatAiConfig {
    fn default() -> Self {
        Self {
            enable: true,
            group_forward: false,
            pan_gu: false,
            forward_name: "ChatAI".to_string(),
            forward_uin: 0,
            pending_reply_ttl_secs: 600,
            chat_gpt: ProviderConfig::with_args(&["!gpt"]),
            qwen: ProviderConfig::with_args(&["!qwen"]),
            gemini: GeminiConfig::default(),
            new_bing: NewBingConfig::default(),
        }
    }
}

/// A text-only provider (ChatGPT, QWen).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub enable: bool,
    /// Trigger arguments selecting this provider.
    pub args: Vec<String>,
    /// Model identifier. Empty = provider default.
    pub model: String,
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    fn with_args(args: &[&str]) -> Self {
        Self {
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Gemini — text model for prompts without images, vision model otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiConfig {
    pub enable: bool,
    pub args: Vec<String>,
    pub api_key: String,
    pub model: String,
    pub vision_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            enable: false,
            args: vec!["!gemini".to_string()],
            api_key: String::new(),
            model: "gemini-pro".to_string(),
            vision_model: "gemini-pro-vision".to_string(),
            api_base: None,
        }
    }
}

impl GeminiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// NewBing — cookie-authenticated chat with a randomized `X-Forwarded-For`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewBingConfig {
    pub enable: bool,
    pub args: Vec<String>,
    /// Conversation style: `Creative`, `Balanced` or `Precise`.
    pub model: String,
    /// `_U` cookie value, or a full cookie header string.
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wss_url: Option<String>,
    /// Address ranges for the forwarded-for header. Empty = built-in pool.
    pub ip_ranges: Vec<IpRangeConfig>,
}

impl Default for NewBingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            args: vec!["!bing".to_string()],
            model: "Creative".to_string(),
            token: String::new(),
            api_base: None,
            wss_url: None,
            ip_ranges: Vec::new(),
        }
    }
}

impl NewBingConfig {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }
}

/// An inclusive IPv4 range, `["4.150.64.0", "4.150.127.255"]` in JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRangeConfig(pub Ipv4Addr, pub Ipv4Addr);

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
