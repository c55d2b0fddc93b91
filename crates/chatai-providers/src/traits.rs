//! Provider trait and error type.
//!
//! Every backend (ChatGPT, QWen, Gemini, NewBing) implements [`ChatProvider`].
//! Failures stay typed as [`ProviderError`] until the dispatcher formats the
//! answer; its `Display` text is what the user finally sees.

use async_trait::async_trait;

use crate::image::FetchedImage;
use crate::registry::ProviderKind;

/// Errors from a provider call.
///
/// The `Display` strings are user-facing: the dispatcher sends them in place
/// of an answer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection or transport failure.
    #[error("{provider} request error: {message}")]
    Network {
        provider: &'static str,
        message: String,
    },

    /// Non-2xx HTTP status.
    #[error("{provider} API error: {status} {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Response body could not be understood.
    #[error("{provider} decode error: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// Streaming broke off. `partial` holds the text gathered so far.
    #[error("{partial}{provider} stream error: {message}")]
    Stream {
        provider: &'static str,
        partial: String,
        message: String,
    },

    /// The backend refused or ended the exchange unexpectedly.
    #[error("{provider} {stage} error: {message}")]
    Protocol {
        provider: &'static str,
        stage: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn network(provider: &'static str, err: impl std::fmt::Display) -> Self {
        ProviderError::Network {
            provider,
            message: err.to_string(),
        }
    }

    pub fn decode(provider: &'static str, err: impl std::fmt::Display) -> Self {
        ProviderError::Decode {
            provider,
            message: err.to_string(),
        }
    }

    /// Name of the provider that failed.
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Network { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::Stream { provider, .. }
            | ProviderError::Protocol { provider, .. } => provider,
        }
    }
}

/// Capability shared by all AI backends: prompt (+ images) in, text out.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Model (or conversation style) used to answer.
    fn model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str {
        self.kind().spec().display_name
    }

    /// Answer a single-turn prompt.
    ///
    /// `images` is only non-empty for backends whose spec accepts images.
    /// The returned text already carries the `"<model>: "` prefix.
    async fn answer(&self, prompt: &str, images: &[FetchedImage]) -> Result<String, ProviderError>;
}
