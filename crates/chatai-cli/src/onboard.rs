//! `chatai onboard` — write a default configuration file.
//!
//! An existing file is left untouched so hand edits survive re-running it.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use chatai_core::config::{save_config, Config};

/// Whether a new file was written.
fn write_default(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }
    save_config(&Config::default(), Some(config_path))
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;
    Ok(true)
}

pub fn run(config_path: &Path) -> Result<()> {
    println!();
    println!("{}", "ChatAI — Setup".cyan().bold());
    println!();

    if write_default(config_path)? {
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
    }

    println!();
    println!("  Next steps:");
    println!("    1. Set onebot.wsUrl (and accessToken) for your OneBot implementation");
    println!("    2. Enable a provider under chatAi and add its apiKey / token");
    println!("    3. Check with `chatai status`, then run `chatai gateway`");
    println!();

    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
