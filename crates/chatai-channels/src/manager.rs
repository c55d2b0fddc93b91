//! Channel Manager — channel lifecycle and outbound action routing.
//!
//! Channels run on their own tasks; a router task drains the bus's
//! outbound queue into the outbound channel until shutdown.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use chatai_core::bus::queue::MessageBus;

use crate::base::Channel;

// ─────────────────────────────────────────────
// ChannelManager
// ─────────────────────────────────────────────

/// Owns the platform channels and routes dispatcher actions to them.
///
/// Actions on the bus carry no channel name: every action goes to the
/// outbound channel, which is the first one registered unless changed
/// with [`ChannelManager::route_to`].
pub struct ChannelManager {
    /// In registration order; names are unique.
    channels: Vec<Arc<dyn Channel>>,
    outbound: Option<String>,
    bus: Arc<MessageBus>,
    shutdown: Arc<Notify>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: Vec::new(),
            outbound: None,
            bus,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Add a channel. A channel with the same name is replaced in place.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        match self.channels.iter_mut().find(|c| c.name() == name) {
            Some(slot) => {
                debug!(channel = %name, "replacing channel");
                *slot = channel;
            }
            None => {
                info!(channel = %name, "channel registered");
                self.channels.push(channel);
            }
        }
        self.outbound.get_or_insert(name);
    }

    /// Send outbound actions to `name` instead of the first registered channel.
    pub fn route_to(&mut self, name: impl Into<String>) {
        self.outbound = Some(name.into());
    }

    pub fn outbound_channel(&self) -> Option<&str> {
        self.outbound.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.iter().find(|c| c.name() == name)
    }

    /// Registered channel names, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|c| c.name().to_string()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Spawn every channel and the outbound router, then wait for shutdown.
    pub async fn start_all(&self) -> Result<()> {
        if self.channels.is_empty() {
            warn!("no platform channel registered");
            return Ok(());
        }

        info!(channels = ?self.channel_names(), outbound = ?self.outbound, "starting channels");

        for channel in &self.channels {
            let channel = channel.clone();
            tokio::spawn(async move {
                let name = channel.name().to_string();
                match channel.start().await {
                    Ok(()) => info!(channel = %name, "channel task ended"),
                    Err(e) => error!(channel = %name, error = %e, "channel failed"),
                }
            });
        }

        let target = self.outbound.as_deref().and_then(|name| self.get(name)).cloned();
        if target.is_none() {
            warn!(outbound = ?self.outbound, "outbound channel missing; actions will be dropped");
        }

        tokio::spawn(Self::route_actions(
            self.bus.clone(),
            target,
            self.shutdown.clone(),
        ));

        self.shutdown.notified().await;
        info!("channel manager stopped");
        Ok(())
    }

    /// Signal shutdown, then stop channels in registration order.
    pub async fn stop_all(&self) {
        self.shutdown.notify_waiters();

        for channel in &self.channels {
            if let Err(e) = channel.stop().await {
                error!(channel = channel.name(), error = %e, "channel stop failed");
            }
        }
        info!(count = self.channels.len(), "channels stopped");
    }

    /// Drain the outbound queue into `target` until the bus closes or
    /// shutdown is signaled. A failed send is logged and the action dropped.
    async fn route_actions(
        bus: Arc<MessageBus>,
        target: Option<Arc<dyn Channel>>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            let action = tokio::select! {
                action = bus.consume_outbound() => action,
                _ = shutdown.notified() => break,
            };
            let Some(action) = action else {
                debug!("outbound queue closed");
                break;
            };

            let Some(channel) = &target else {
                warn!(action = %action.summary(), "no outbound channel, action dropped");
                continue;
            };
            debug!(channel = channel.name(), action = action.name(), "routing action");
            if let Err(e) = channel.send(&action).await {
                error!(
                    channel = channel.name(),
                    action = action.name(),
                    error = %e,
                    "action delivery failed"
                );
            }
        }
        debug!("action router exited");
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
