//! Channel trait — the interface a platform connection implements.
//!
//! A channel:
//! - `start()` — connects and publishes inbound events to the bus (long-running)
//! - `stop()` — graceful shutdown
//! - `send()` — writes an outbound OneBot action to the platform
//! - `name()` — identifier used by the `ChannelManager`

use async_trait::async_trait;
use chatai_core::onebot::Action;

/// Every platform connection implements this trait.
///
/// The `ChannelManager` holds `Arc<dyn Channel>` and orchestrates
/// start/stop/send.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name (e.g. "onebot").
    fn name(&self) -> &str;

    /// Connect and listen for events until `stop()` is called.
    async fn start(&self) -> anyhow::Result<()>;

    /// Graceful shutdown — stop listening and release the connection.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver an action to the platform.
    async fn send(&self, action: &Action) -> anyhow::Result<()>;
}
