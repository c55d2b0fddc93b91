//! `chatai status` — show configuration and provider status.
//!
//! - Config path, OneBot endpoint, plugin switches
//! - Per provider: enabled, credential set, trigger args, model

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use chatai_core::config::{ChatAiConfig, Config};
use chatai_providers::{provider_settings, ProviderKind, ProviderSettings};

use crate::helpers::mark;

/// Model column: Gemini shows its text and vision models.
fn model_label(config: &ChatAiConfig, settings: &ProviderSettings<'_>) -> String {
    match settings.kind {
        ProviderKind::Gemini => format!(
            "{} / {}",
            settings.effective_model(),
            config.gemini.vision_model
        ),
        _ => settings.effective_model(),
    }
}

fn state_label(settings: &ProviderSettings<'_>) -> String {
    if settings.is_active() {
        "active".green().to_string()
    } else if !settings.enabled {
        "disabled".dimmed().to_string()
    } else if !settings.configured {
        "missing credential".yellow().to_string()
    } else {
        "no trigger args".yellow().to_string()
    }
}

pub fn run(config_path: &Path, config: &Config) -> Result<()> {
    println!();
    println!("{}", "ChatAI Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );
    println!("  {:<18} {}", "OneBot:".bold(), config.onebot.ws_url);
    println!(
        "  {:<18} {}",
        "Access token:".bold(),
        mark(!config.onebot.access_token.is_empty())
    );

    let chat_ai = &config.chat_ai;
    println!(
        "  {:<18} enable {} | groupForward {} | panGu {} | pending TTL {}s",
        "Plugin:".bold(),
        mark(chat_ai.enable),
        mark(chat_ai.group_forward),
        mark(chat_ai.pan_gu),
        chat_ai.pending_reply_ttl_secs
    );

    println!();
    println!("  {}", "Providers (priority order):".bold());
    for kind in ProviderKind::ALL {
        let settings = provider_settings(chat_ai, kind);
        println!(
            "    {:<10} {} enable  {} credential  {:<20} {:<28} {}",
            kind.to_string(),
            mark(settings.enabled),
            mark(settings.configured),
            settings.args.join(" "),
            model_label(chat_ai, &settings).dimmed(),
            state_label(&settings)
        );
    }
    println!();

    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_label_shows_both_models() {
        let cfg = ChatAiConfig::default();
        let settings = provider_settings(&cfg, ProviderKind::Gemini);
        assert_eq!(model_label(&cfg, &settings), "gemini-pro / gemini-pro-vision");
    }

    #[test]
    fn blank_model_falls_back_to_default() {
        let mut cfg = ChatAiConfig::default();
        cfg.qwen.model = "  ".into();
        let settings = provider_settings(&cfg, ProviderKind::QWen);
        assert_eq!(model_label(&cfg, &settings), "qwen-turbo");
    }

    #[test]
    fn state_reflects_missing_pieces() {
        let mut cfg = ChatAiConfig::default();
        assert!(state_label(&provider_settings(&cfg, ProviderKind::ChatGpt)).contains("disabled"));

        cfg.chat_gpt.enable = true;
        assert!(state_label(&provider_settings(&cfg, ProviderKind::ChatGpt))
            .contains("missing credential"));

        cfg.chat_gpt.api_key = "sk".into();
        assert!(state_label(&provider_settings(&cfg, ProviderKind::ChatGpt)).contains("active"));

        cfg.chat_gpt.args.clear();
        assert!(state_label(&provider_settings(&cfg, ProviderKind::ChatGpt))
            .contains("no trigger args"));
    }
}
