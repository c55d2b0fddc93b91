//! ChatAI Channels — platform connections.
//!
//! This crate provides:
//! - **base**: The `Channel` trait every platform connection implements
//! - **manager**: `ChannelManager` — lifecycle orchestration and outbound action routing
//! - **onebot**: forward WebSocket client for OneBot v11 implementations (feature `onebot`)

pub mod base;
pub mod manager;

#[cfg(feature = "onebot")]
pub mod onebot;

pub use base::Channel;
pub use manager::ChannelManager;

#[cfg(feature = "onebot")]
pub use onebot::OneBotChannel;
