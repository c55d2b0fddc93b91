//! Gateway command — OneBot channel + dispatcher.
//!
//! Startup sequence:
//! 1. Create message bus
//! 2. Build the dispatcher (providers, image fetcher, correlator) from config
//! 3. Create channel manager, register the OneBot channel
//! 4. Run: `tokio::select!` of dispatcher + channel manager
//! 5. Handle Ctrl+C for graceful shutdown

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tracing::{error, info};

use chatai_channels::{ChannelManager, OneBotChannel};
use chatai_core::bus::queue::MessageBus;
use chatai_core::config::Config;
use chatai_dispatch::Dispatcher;

use crate::helpers;

/// Bus capacity shared by both directions.
const BUS_CAPACITY: usize = 100;

pub async fn run(config: &Config) -> Result<()> {
    helpers::print_banner("Gateway");

    let bus = Arc::new(MessageBus::new(BUS_CAPACITY));
    let dispatcher = Arc::new(Dispatcher::from_config(bus.clone(), &config.chat_ai));

    let mut channel_manager = ChannelManager::new(bus.clone());
    let onebot = OneBotChannel::from_config(&config.onebot, bus.clone());
    let ws_url = onebot.ws_url().to_string();
    channel_manager.register(Arc::new(onebot));

    let routes = dispatcher.router().routes();
    info!(
        onebot = %ws_url,
        providers = routes.len(),
        enabled = config.chat_ai.enable,
        "gateway starting"
    );

    println!("  OneBot:    {ws_url}");
    println!(
        "  Plugin:    {}",
        if config.chat_ai.enable {
            "enabled".green().to_string()
        } else {
            "disabled".red().to_string()
        }
    );
    println!("  Providers: {} active", routes.len());
    for route in routes {
        println!("    {:<10} {}", route.kind.to_string(), route.args.join(" "));
    }
    println!();

    if routes.is_empty() {
        println!("  ⚠  No provider is enabled and configured; messages will be ignored.");
        println!("     Edit the config, then check with `chatai status`.");
        println!();
    }

    println!("  Ctrl+C to stop");
    println!();

    tokio::select! {
        _ = dispatcher.clone().run() => {
            info!("dispatcher exited");
        }
        result = channel_manager.start_all() => {
            if let Err(e) = result {
                error!(error = %e, "channel manager error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("  Shutting down...");
            info!("received Ctrl+C, shutting down");
            channel_manager.stop_all().await;
        }
    }

    println!("  Gateway stopped.");
    Ok(())
}
