//! ChatAI CLI — entry point.
//!
//! # Commands
//!
//! - `chatai gateway` — connect to the OneBot implementation and answer chats
//! - `chatai ask "<message>"` — dispatch one message locally and print the answer
//! - `chatai status` — show configuration and provider status
//! - `chatai onboard` — write a default config

mod ask;
mod gateway;
mod helpers;
mod onboard;
mod status;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use chatai_core::config::{get_config_path, load_config, Config};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// ChatAI — multi-provider AI replies for OneBot chats
#[derive(Parser)]
#[command(name = "chatai", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.chatai/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to OneBot and answer chat messages until Ctrl+C
    Gateway {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Dispatch one message through the router and print the answer
    Ask {
        /// Message text, trigger arg included (e.g. "!gpt hello")
        message: String,

        /// Sender user id
        #[arg(short, long, default_value_t = 10000)]
        user: i64,

        /// Treat the message as sent in this group
        #[arg(short, long)]
        group: Option<i64>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and provider status
    Status,

    /// Write a default configuration file
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .as_deref()
        .map(helpers::expand_tilde)
        .unwrap_or_else(get_config_path);

    match cli.command {
        Commands::Gateway { logs } => {
            init_logging(logs, "info");
            gateway::run(&load(&config_path)).await
        }
        Commands::Ask {
            message,
            user,
            group,
            logs,
        } => {
            init_logging(logs, "warn");
            ask::run(&load(&config_path), &message, user, group).await
        }
        Commands::Status => status::run(&config_path, &load(&config_path)),
        Commands::Onboard => onboard::run(&config_path),
    }
}

fn load(path: &Path) -> Config {
    load_config(Some(path))
}

/// Initialize tracing/logging. `RUST_LOG` wins over `quiet_level` unless
/// `--logs` was given.
fn init_logging(verbose: bool, quiet_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("chatai=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(quiet_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
