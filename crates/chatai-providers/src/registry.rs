//! Provider registry — static specs for the four backends and the builder
//! that turns a [`ChatAiConfig`] into ready-to-call providers.
//!
//! Order matters: [`PROVIDERS`] is the routing priority (ChatGPT, QWen,
//! Gemini, NewBing). When a message carries trigger args for several
//! providers, the earliest one wins.

use std::sync::Arc;

use tracing::{debug, warn};

use chatai_core::config::ChatAiConfig;

use crate::bing::NewBingProvider;
use crate::gemini::GeminiProvider;
use crate::ip_pool::IpPool;
use crate::openai::OpenAiProvider;
use crate::qwen::QWenProvider;
use crate::traits::ChatProvider;

// ─────────────────────────────────────────────
// ProviderKind / ProviderSpec
// ─────────────────────────────────────────────

/// The closed set of supported backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    ChatGpt,
    QWen,
    Gemini,
    NewBing,
}

impl ProviderKind {
    /// All kinds in routing priority order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::ChatGpt,
        ProviderKind::QWen,
        ProviderKind::Gemini,
        ProviderKind::NewBing,
    ];

    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            ProviderKind::ChatGpt => &PROVIDERS[0],
            ProviderKind::QWen => &PROVIDERS[1],
            ProviderKind::Gemini => &PROVIDERS[2],
            ProviderKind::NewBing => &PROVIDERS[3],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PROVIDERS
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.kind)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.spec().display_name)
    }
}

/// Static metadata for one backend.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Internal name (e.g. `"qwen"`).
    pub name: &'static str,
    /// Human-readable name for logs and error text.
    pub display_name: &'static str,
    pub default_api_base: &'static str,
    pub default_model: &'static str,
    /// Whether image segments are fetched and attached.
    pub accepts_images: bool,
    /// Whether a reply-chain reference suspends the request for a lookup.
    pub reply_lookup: bool,
    /// Sent to the chat before the call starts, for slow backends.
    pub progress_notice: Option<&'static str>,
}

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        kind: ProviderKind::ChatGpt,
        name: "chatgpt",
        display_name: "ChatGPT",
        default_api_base: "https://api.openai.com/v1",
        default_model: "gpt-3.5-turbo",
        accepts_images: false,
        reply_lookup: false,
        progress_notice: None,
    },
    ProviderSpec {
        kind: ProviderKind::QWen,
        name: "qwen",
        display_name: "QWen",
        default_api_base: "https://dashscope.aliyuncs.com/api/v1",
        default_model: "qwen-turbo",
        accepts_images: false,
        reply_lookup: false,
        progress_notice: None,
    },
    ProviderSpec {
        kind: ProviderKind::Gemini,
        name: "gemini",
        display_name: "Gemini",
        default_api_base: "https://generativelanguage.googleapis.com/v1beta",
        default_model: "gemini-pro",
        accepts_images: true,
        reply_lookup: true,
        progress_notice: None,
    },
    ProviderSpec {
        kind: ProviderKind::NewBing,
        name: "newbing",
        display_name: "NewBing",
        default_api_base: "https://www.bing.com",
        default_model: "Creative",
        accepts_images: false,
        reply_lookup: false,
        progress_notice: Some("NewBing 回复生成中，速度较慢请勿重复发送请求"),
    },
];

// ─────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────

/// A built provider together with the trigger args that select it.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub kind: ProviderKind,
    pub args: Vec<String>,
    pub provider: Arc<dyn ChatProvider>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("model", &self.provider.model())
            .finish()
    }
}

/// The config fields every provider section shares.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings<'a> {
    pub kind: ProviderKind,
    pub enabled: bool,
    /// API key (or NewBing cookie) present.
    pub configured: bool,
    /// Trigger args, trimmed, blanks dropped.
    pub args: Vec<String>,
    /// Configured model, before defaulting.
    pub model: &'a str,
}

impl ProviderSettings<'_> {
    /// Whether [`create_providers`] builds this provider.
    pub fn is_active(&self) -> bool {
        self.enabled && self.configured && !self.args.is_empty()
    }

    /// Configured model, or the backend default.
    pub fn effective_model(&self) -> String {
        resolve_model(self.model, self.kind.spec())
    }
}

/// Read the section of `config` belonging to `kind`.
pub fn provider_settings(config: &ChatAiConfig, kind: ProviderKind) -> ProviderSettings<'_> {
    let (enabled, configured, args, model) = match kind {
        ProviderKind::ChatGpt => (
            config.chat_gpt.enable,
            config.chat_gpt.is_configured(),
            &config.chat_gpt.args,
            config.chat_gpt.model.as_str(),
        ),
        ProviderKind::QWen => (
            config.qwen.enable,
            config.qwen.is_configured(),
            &config.qwen.args,
            config.qwen.model.as_str(),
        ),
        ProviderKind::Gemini => (
            config.gemini.enable,
            config.gemini.is_configured(),
            &config.gemini.args,
            config.gemini.model.as_str(),
        ),
        ProviderKind::NewBing => (
            config.new_bing.enable,
            config.new_bing.is_configured(),
            &config.new_bing.args,
            config.new_bing.model.as_str(),
        ),
    };

    ProviderSettings {
        kind,
        enabled,
        configured,
        args: args
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        model,
    }
}

/// Build every enabled, credentialed provider in priority order.
///
/// Enabled providers without a credential or without any trigger arg are
/// skipped with a warning; disabled ones are skipped silently.
pub fn create_providers(config: &ChatAiConfig) -> Vec<RegisteredProvider> {
    let mut out = Vec::new();

    for kind in ProviderKind::ALL {
        let settings = provider_settings(config, kind);

        if !settings.enabled {
            continue;
        }
        if !settings.configured {
            warn!(provider = %kind, "Provider enabled but no credential configured, skipping");
            continue;
        }
        if settings.args.is_empty() {
            warn!(provider = %kind, "Provider enabled but has no trigger args, skipping");
            continue;
        }
        let args = settings.args;

        let provider: Arc<dyn ChatProvider> = match kind {
            ProviderKind::ChatGpt => Arc::new(OpenAiProvider::new(&config.chat_gpt)),
            ProviderKind::QWen => Arc::new(QWenProvider::new(&config.qwen)),
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(&config.gemini)),
            ProviderKind::NewBing => Arc::new(NewBingProvider::new(
                &config.new_bing,
                IpPool::from_config(&config.new_bing.ip_ranges),
            )),
        };

        debug!(provider = %kind, model = provider.model(), args = ?args, "Provider registered");
        out.push(RegisteredProvider {
            kind,
            args,
            provider,
        });
    }

    out
}

/// Resolve a configured base URL against the registry default.
pub(crate) fn resolve_api_base(configured: Option<&str>, spec: &ProviderSpec) -> String {
    configured
        .filter(|b| !b.trim().is_empty())
        .unwrap_or(spec.default_api_base)
        .trim_end_matches('/')
        .to_string()
}

/// Resolve a configured model against the spec default.
pub(crate) fn resolve_model(configured: &str, spec: &ProviderSpec) -> String {
    if configured.trim().is_empty() {
        spec.default_model.to_string()
    } else {
        configured.trim().to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
