//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILCORE_CONFIG` (environment variable)
//! 2. `~/.config/mailcore/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailcore\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Where message files and quarantined files live.
    pub storage: StorageConfig,
    /// Size limits and streaming tuning.
    pub limits: LimitsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the log directory.
    pub log_dir: Option<PathBuf>,
    /// Host name used in generated Message-IDs. Defaults to the system host name.
    pub host_name: Option<String>,
}

/// Storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for message files.
    pub data_dir: Option<PathBuf>,
    /// Where messages that fail to parse are copied for diagnosis.
    pub quarantine_dir: Option<PathBuf>,
}

/// Size limits and streaming tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Server-wide maximum APPEND size in KB (0 = unlimited).
    pub max_message_size_kb: u64,
    /// Messages larger than this (bytes) are never parsed.
    pub max_load_size: u64,
    /// Literal bytes buffered in memory before an early flush to disk.
    pub flush_threshold: usize,
    /// Number of accounts and domains kept in the directory cache.
    pub directory_cache_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
            host_name: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size_kb: 20 * 1024,    // 20 MB
            max_load_size: 80 * 1024 * 1024, // 80 MB
            flush_threshold: 20_000,
            directory_cache_size: 256,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILCORE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailcore").join("config.toml"))
}

/// Return the log directory.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailcore")
}

/// Return the root directory for message files.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.storage.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailcore")
        .join("data")
}

/// Return the directory that receives copies of unparseable messages.
pub fn quarantine_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.storage.quarantine_dir {
        return dir.clone();
    }
    log_dir(config).join("problematic-messages")
}

/// Host name for generated Message-IDs: config, then the system, then `localhost`.
pub fn host_name(config: &Config) -> String {
    if let Some(ref name) = config.general.host_name {
        return name.clone();
    }
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read system host name");
            "localhost".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.limits.flush_threshold, 20_000);
        assert_eq!(cfg.limits.max_load_size, 80 * 1024 * 1024);
        assert!(cfg.storage.data_dir.is_none());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.general.log_level, cfg.general.log_level);
        assert_eq!(
            parsed.limits.max_message_size_kb,
            cfg.limits.max_message_size_kb
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[limits]
max_message_size_kb = 0

[general]
host_name = "mx.example.com"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.limits.max_message_size_kb, 0);
        assert_eq!(cfg.limits.flush_threshold, 20_000);
        assert_eq!(host_name(&cfg), "mx.example.com");
    }

    #[test]
    fn test_quarantine_dir_follows_log_dir() {
        let mut cfg = Config::default();
        cfg.general.log_dir = Some(PathBuf::from("/var/log/mailcore"));
        assert_eq!(
            quarantine_dir(&cfg),
            PathBuf::from("/var/log/mailcore/problematic-messages")
        );
    }

    #[test]
    fn test_load_config_from_bad_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[limits\nbroken").unwrap();
        let cfg = load_config_from(&path);
        assert_eq!(cfg.limits.flush_threshold, 20_000);
    }
}
