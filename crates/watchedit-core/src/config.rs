use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Root application configuration, loaded from `~/.config/watchedit/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub cloud: CloudConfig,
    pub backup: BackupConfig,
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub data_dir: String,
}

/// User-supplied sync endpoint. The API key itself is never written to the
/// config file; it is read from the environment variable named here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub auto_sync: bool,
    pub sync_interval_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub interval_days: u32,
    pub keep: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("watchedit");

        Self {
            data_dir: data_dir.to_string_lossy().to_string(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "WATCHEDIT_API_KEY".to_string(),
            auto_sync: false,
            sync_interval_minutes: 30,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_days: 7,
            keep: 7,
            directory: None,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/watchedit/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("WATCHEDIT_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("watchedit")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("WATCHEDIT_DATA_DIR") {
            self.core.data_dir = dir;
        }
        if let Ok(endpoint) = std::env::var("WATCHEDIT_CLOUD_ENDPOINT") {
            self.cloud.endpoint = Some(endpoint);
        }
    }

    pub fn set_data_dir(&mut self, path: PathBuf) {
        self.core.data_dir = path.to_string_lossy().to_string();
    }

    // ─── Derived paths ─────────────────────────────────────

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.core.data_dir)
    }

    /// Path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("watchedit.db")
    }

    /// Directory holding dated automatic backups.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.directory {
            Some(dir) => PathBuf::from(dir),
            None => self.data_dir().join("backups"),
        }
    }

    /// Cloud endpoint with any trailing slash removed, if configured.
    pub fn cloud_endpoint(&self) -> Option<String> {
        self.cloud
            .endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
    }

    /// Bearer token for the cloud endpoint, read from the configured env var.
    pub fn cloud_api_key(&self) -> Option<String> {
        std::env::var(&self.cloud.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.cloud.api_key_env, "WATCHEDIT_API_KEY");
        assert_eq!(cfg.backup.keep, 7);
        assert!(cfg.cloud.endpoint.is_none());
        assert!(!cfg.core.data_dir.is_empty());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.cloud.endpoint = Some("https://sync.example.com".into());
        cfg.backup.keep = 3;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.cloud.endpoint.as_deref(), Some("https://sync.example.com"));
        assert_eq!(loaded.backup.keep, 3);
        assert_eq!(loaded.core.data_dir, cfg.core.data_dir);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cloud]\nendpoint = \"http://localhost:9000/\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.cloud_endpoint().as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.cloud.sync_interval_minutes, 30);
        assert!(cfg.backup.enabled);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg = AppConfig::load_from(Path::new("/tmp/nonexistent_watchedit_config.toml")).unwrap();
        assert_eq!(cfg.backup.interval_days, 7);
    }

    #[test]
    fn test_derived_paths() {
        let mut cfg = AppConfig::default();
        cfg.set_data_dir(PathBuf::from("/data/watchedit"));
        assert_eq!(cfg.database_path(), PathBuf::from("/data/watchedit/watchedit.db"));
        assert_eq!(cfg.backup_dir(), PathBuf::from("/data/watchedit/backups"));

        cfg.backup.directory = Some("/elsewhere".into());
        assert_eq!(cfg.backup_dir(), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_blank_endpoint_is_unconfigured() {
        let mut cfg = AppConfig::default();
        cfg.cloud.endpoint = Some("   ".into());
        assert!(cfg.cloud_endpoint().is_none());
    }
}
