//! Config loader — reads `~/.chatai/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.chatai/config.json`
//! 3. Environment variables `CHATAI_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig};

/// Why a config file could not be used.
#[derive(Debug, thiserror::Error)]
enum ConfigFileError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} is not valid config JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// `~/.chatai/config.json`.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load the config at `path` (or the default path) with env overrides applied.
///
/// Never fails: a missing file gives defaults silently, an unreadable or
/// malformed one gives defaults with a warning.
pub fn load_config(path: Option<&Path>) -> Config {
    let path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    let config = if path.exists() {
        read_config_file(&path).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring config file, using defaults");
            Config::default()
        })
    } else {
        info!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    apply_env_overrides(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigFileError> {
    let json_err = |source| ConfigFileError::Json {
        path: path.to_path_buf(),
        source,
    };
    let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw: serde_json::Value = serde_json::from_str(&content).map_err(json_err)?;
    migrate_config(&mut raw);
    let config = serde_json::from_value(raw).map_err(json_err)?;

    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Write `config` as pretty camelCase JSON, creating parent directories.
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Older files nest the plugin section as `plugins.chatAI`; it now lives at
/// the top level as `chatAi`.
fn migrate_config(raw: &mut serde_json::Value) {
    if raw.get("chatAi").is_some() {
        return;
    }
    let legacy = raw
        .get_mut("plugins")
        .and_then(|plugins| plugins.as_object_mut())
        .and_then(|plugins| plugins.remove("chatAI").or_else(|| plugins.remove("chatAi")));

    if let (Some(section), Some(root)) = (legacy, raw.as_object_mut()) {
        root.insert("chatAi".to_string(), section);
        debug!("Migrated plugins.chatAI → chatAi");
    }
}

/// Env var format: `CHATAI_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `CHATAI_ONEBOT__WS_URL` → `onebot.ws_url`
/// - `CHATAI_ONEBOT__ACCESS_TOKEN` → `onebot.access_token`
/// - `CHATAI_CHATAI__ENABLE` / `__GROUP_FORWARD` / `__PAN_GU`
/// - `CHATAI_CHATAI__<CHATGPT|QWEN|GEMINI>__API_KEY` / `__API_BASE` / `__ENABLE`
/// - `CHATAI_CHATAI__NEWBING__TOKEN` / `__ENABLE`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("CHATAI_ONEBOT__WS_URL") {
        config.onebot.ws_url = val;
    }
    if let Ok(val) = std::env::var("CHATAI_ONEBOT__ACCESS_TOKEN") {
        config.onebot.access_token = val;
    }

    let chat_ai = &mut config.chat_ai;
    if let Some(flag) = env_flag("CHATAI_CHATAI__ENABLE") {
        chat_ai.enable = flag;
    }
    if let Some(flag) = env_flag("CHATAI_CHATAI__GROUP_FORWARD") {
        chat_ai.group_forward = flag;
    }
    if let Some(flag) = env_flag("CHATAI_CHATAI__PAN_GU") {
        chat_ai.pan_gu = flag;
    }

    apply_provider_env(&mut chat_ai.chat_gpt, "CHATGPT");
    apply_provider_env(&mut chat_ai.qwen, "QWEN");

    if let Ok(val) = std::env::var("CHATAI_CHATAI__GEMINI__API_KEY") {
        chat_ai.gemini.api_key = val;
    }
    if let Ok(val) = std::env::var("CHATAI_CHATAI__GEMINI__API_BASE") {
        chat_ai.gemini.api_base = Some(val);
    }
    if let Some(flag) = env_flag("CHATAI_CHATAI__GEMINI__ENABLE") {
        chat_ai.gemini.enable = flag;
    }

    if let Ok(val) = std::env::var("CHATAI_CHATAI__NEWBING__TOKEN") {
        chat_ai.new_bing.token = val;
    }
    if let Some(flag) = env_flag("CHATAI_CHATAI__NEWBING__ENABLE") {
        chat_ai.new_bing.enable = flag;
    }

    config
}

/// Apply env var overrides for a single text provider.
fn apply_provider_env(provider: &mut ProviderConfig, name: &str) {
    if let Ok(val) = std::env::var(format!("CHATAI_CHATAI__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("CHATAI_CHATAI__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
    if let Some(flag) = env_flag(&format!("CHATAI_CHATAI__{name}__ENABLE")) {
        provider.enable = flag;
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| val == "true" || val == "1")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/chatai/config.json")));
        assert!(config.chat_ai.enable);
        assert_eq!(config.chat_ai.forward_name, "ChatAI");
    }

    #[test]
    fn test_load_valid_file() {
        let file = config_file(
            r#"{"chatAi": {"groupForward": true, "qWen": {"enable": true, "args": ["!qw"]}}}"#,
        );
        let config = load_config(Some(file.path()));
        assert!(config.chat_ai.group_forward);
        assert!(config.chat_ai.qwen.enable);
        assert_eq!(config.chat_ai.qwen.args, vec!["!qw"]);
    }

    #[test]
    fn test_load_invalid_json_gives_defaults() {
        let file = config_file("{ this is not json");
        let config = load_config(Some(file.path()));
        assert!(!config.chat_ai.group_forward);
    }

    #[test]
    fn test_load_wrong_types_gives_defaults() {
        let file = config_file(r#"{"chatAi": {"groupForward": "yes please"}}"#);
        let config = load_config(Some(file.path()));
        assert!(!config.chat_ai.group_forward);
    }

    #[test]
    fn test_migrate_legacy_plugin_section() {
        let mut raw = serde_json::json!({
            "plugins": {"chatAI": {"panGu": true}}
        });
        migrate_config(&mut raw);
        assert_eq!(raw["chatAi"]["panGu"], true);
        assert!(raw["plugins"].get("chatAI").is_none());
    }

    #[test]
    fn test_migration_keeps_existing_section() {
        let mut raw = serde_json::json!({
            "chatAi": {"panGu": false},
            "plugins": {"chatAI": {"panGu": true}}
        });
        migrate_config(&mut raw);
        assert_eq!(raw["chatAi"]["panGu"], false);
    }

    #[test]
    fn test_read_errors_name_the_file() {
        let file = config_file("[1, 2");
        let err = read_config_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigFileError::Json { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("config.json");

        let mut config = Config::default();
        config.chat_ai.gemini.enable = true;
        config.chat_ai.gemini.api_key = "g-key".into();
        save_config(&config, Some(&path)).unwrap();

        let loaded = load_config(Some(&path));
        assert!(loaded.chat_ai.gemini.enable);
        assert_eq!(loaded.chat_ai.gemini.api_key, "g-key");
    }
}
