use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default session lifetime in minutes.
pub const DEFAULT_LIFETIME_MINUTES: u64 = 120;

/// Default number of documents deleted per `gc` call.
pub const DEFAULT_GC_BATCH_SIZE: usize = 100;

/// Root configuration for docsession.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct Config {
    pub session: SessionConfig,
    pub backend: BackendConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Collection (table) that holds one document per session.
    pub table: String,
    /// Minutes after the last write at which a session reads as empty.
    pub lifetime: u64,
    /// Upper bound on documents deleted by a single `gc` call.
    pub gc_batch_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            table: "sessions".to_string(),
            lifetime: DEFAULT_LIFETIME_MINUTES,
            gc_batch_size: DEFAULT_GC_BATCH_SIZE,
        }
    }
}

impl SessionConfig {
    /// Session lifetime expressed in seconds, the unit `gc` takes.
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime.saturating_mul(60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    File,
    Memory,
    Dynamodb,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "memory" => Ok(BackendKind::Memory),
            "dynamodb" | "dynamo" => Ok(BackendKind::Dynamodb),
            other => Err(ConfigError::Invalid(format!("unknown backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Root directory for the file backend. Defaults to `~/.docsession/data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl BackendConfig {
    pub fn data_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| get_data_dir().join("data"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    /// Max `gc` calls per tick while batches keep coming back full.
    pub max_passes: u32,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            max_passes: 10,
        }
    }
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `DOCSESSION_CONFIG` env var: full JSON config
/// 2. Individual env vars (merged on top of the file config)
/// 3. File fallback (`~/.docsession/config.json`)
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("DOCSESSION_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse DOCSESSION_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Overlay individual settings looked up through `lookup` onto `cfg`.
///
/// Unparseable values are logged and ignored.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SESSION_TABLE") {
        if !v.trim().is_empty() {
            cfg.session.table = v.trim().to_string();
        }
    }
    if let Some(v) = lookup("SESSION_LIFETIME") {
        match v.trim().parse() {
            Ok(n) => cfg.session.lifetime = n,
            Err(e) => tracing::warn!("Ignoring SESSION_LIFETIME={:?}: {}", v, e),
        }
    }
    if let Some(v) = lookup("SESSION_GC_BATCH_SIZE") {
        match v.trim().parse() {
            Ok(n) => cfg.session.gc_batch_size = n,
            Err(e) => tracing::warn!("Ignoring SESSION_GC_BATCH_SIZE={:?}: {}", v, e),
        }
    }
    if let Some(v) = lookup("DOCSESSION_BACKEND") {
        match v.parse() {
            Ok(kind) => cfg.backend.kind = kind,
            Err(e) => tracing::warn!("Ignoring DOCSESSION_BACKEND: {}", e),
        }
    }
    if let Some(v) = lookup("DOCSESSION_DATA_DIR") {
        if !v.trim().is_empty() {
            cfg.backend.data_dir = Some(PathBuf::from(v.trim()));
        }
    }
}

/// Get the config file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the docsession data directory.
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docsession")
}

/// Load configuration from file or fall back to defaults.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> std::result::Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.session.table, "sessions");
        assert_eq!(cfg.session.lifetime, 120);
        assert_eq!(cfg.session.gc_batch_size, 100);
        assert_eq!(cfg.backend.kind, BackendKind::File);
        assert!(cfg.backend.data_dir.is_none());
        assert_eq!(cfg.session.lifetime_secs(), 7200);
    }

    #[test]
    fn test_config_camelcase_partial() {
        let json = r#"{
            "session": { "table": "web_sessions", "gcBatchSize": 25 },
            "backend": { "kind": "memory" }
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.session.table, "web_sessions");
        assert_eq!(cfg.session.gc_batch_size, 25);
        // untouched fields keep their defaults
        assert_eq!(cfg.session.lifetime, 120);
        assert_eq!(cfg.backend.kind, BackendKind::Memory);
        assert_eq!(cfg.sweeper.max_passes, 10);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SESSION_TABLE", "app_sessions"),
            ("SESSION_LIFETIME", "30"),
            ("SESSION_GC_BATCH_SIZE", "250"),
            ("DOCSESSION_BACKEND", "dynamodb"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.session.table, "app_sessions");
        assert_eq!(cfg.session.lifetime, 30);
        assert_eq!(cfg.session.gc_batch_size, 250);
        assert_eq!(cfg.backend.kind, BackendKind::Dynamodb);
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, |k| match k {
            "SESSION_GC_BATCH_SIZE" => Some("lots".to_string()),
            "DOCSESSION_BACKEND" => Some("redis".to_string()),
            _ => None,
        });
        assert_eq!(cfg.session.gc_batch_size, DEFAULT_GC_BATCH_SIZE);
        assert_eq!(cfg.backend.kind, BackendKind::File);
    }

    #[test]
    fn test_save_and_load_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut cfg = Config::default();
        cfg.session.lifetime = 45;
        cfg.backend.data_dir = Some(tmp.path().join("data"));
        save_config(&cfg, Some(&path)).unwrap();

        let loaded = load_config(Some(&path));
        assert_eq!(loaded.session.lifetime, 45);
        assert_eq!(loaded.backend.data_dir, Some(tmp.path().join("data")));
    }

    #[test]
    fn test_load_config_bad_json_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cfg = load_config(Some(&path));
        assert_eq!(cfg.session.table, "sessions");
    }
}
