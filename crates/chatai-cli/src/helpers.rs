//! Shared CLI helpers — path expansion, banner, answer printing.

use std::path::PathBuf;

use colored::Colorize;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Print a dispatched answer to stdout.
pub fn print_answer(answer: &str) {
    println!();
    println!("{}", "ChatAI".cyan().bold());
    if answer.is_empty() {
        println!("{}", "(empty answer)".dimmed());
    } else {
        println!("{answer}");
    }
    println!();
}

pub fn print_banner(mode: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "ChatAI".cyan().bold(), version.dimmed());
    println!("  Mode: {mode}");
    println!();
}

/// Check mark or a dimmed dot.
pub fn mark(ok: bool) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        "·".dimmed().to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
