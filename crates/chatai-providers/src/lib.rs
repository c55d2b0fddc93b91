//! AI provider layer for ChatAI.
//!
//! # Architecture
//!
//! - [`traits::ChatProvider`] — trait that all backends implement
//! - [`registry`] — static specs for the four backends, in routing priority
//! - [`openai`], [`qwen`], [`gemini`], [`bing`] — the backend clients
//! - [`image`] — image download, format sniffing, GIF → JPEG transcoding
//! - [`ip_pool`] — random origin addresses for NewBing

use std::time::Duration;

use tracing::warn;

pub mod bing;
pub mod gemini;
pub mod image;
pub mod ip_pool;
pub mod openai;
pub mod qwen;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use self::image::{FetchError, FetchedImage, ImageFetcher, ImageKind, ImageSource};
pub use ip_pool::{AddressRange, IpPool};
pub use registry::{
    create_providers, provider_settings, ProviderKind, ProviderSettings, ProviderSpec,
    RegisteredProvider, PROVIDERS,
};
pub use traits::{ChatProvider, ProviderError};

/// Shared HTTP client construction with a per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}
