//! Configuration system — schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use chatai_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Group forward: {}", cfg.chat_ai.group_forward);
//! ```

pub mod loader;
pub mod schema;

// Re-export key types
pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    ChatAiConfig, Config, GeminiConfig, IpRangeConfig, NewBingConfig, OneBotConfig, ProviderConfig,
};
