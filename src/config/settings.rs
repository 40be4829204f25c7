//! Call-Konfiguration
//!
//! Reihenfolge: Defaults → `config.json` → Umgebungsvariablen
//! (`CALL_APP_ID`, `CALL_CHANNEL`, `CALL_TOKEN`, `CALL_LOG`).

use crate::identity::Credential;
use crate::media::DEFAULT_AUDIO_OUTPUT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DEFAULT_CHANNEL: &str = "test-channel";

pub const DEFAULT_LOG_FILTER: &str = "group_call=debug";

const CONFIG_FILE: &str = "config.json";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No app id configured (set CALL_APP_ID or app_id in config.json)")]
    MissingAppId,

    #[error("Could not determine config directory")]
    NoConfigDir,
}

// ============================================================================
// CALL CONFIG
// ============================================================================

/// Konfiguration einer Call-Session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallConfig {
    pub app_id: String,
    pub default_channel: String,
    pub credential: Option<Credential>,
    pub log_filter: String,
    /// Sink für entfernte Audio-Tracks; leer schaltet die Wiedergabe ab
    pub audio_output: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            default_channel: DEFAULT_CHANNEL.to_string(),
            credential: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            audio_output: DEFAULT_AUDIO_OUTPUT.to_string(),
        }
    }
}

impl CallConfig {
    /// Konfiguration mit App-ID und Defaults
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Lädt die Konfiguration aus dem App-Konfigurationsverzeichnis
    ///
    /// Die Datei liegt unter:
    /// - Windows: `%APPDATA%/group-call/config/config.json`
    /// - macOS: `~/Library/Application Support/group-call/config.json`
    /// - Linux: `~/.config/group-call/config.json`
    ///
    /// Fehlt die Datei, gelten Defaults plus Umgebungsvariablen.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        let file_config = if path.exists() {
            tracing::info!("Loading config from {:?}", path);
            Self::read_file(&path)?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };

        file_config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Lädt die Konfiguration aus einer bestimmten Datei
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::read_file(path)?.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Wendet Overrides an und prüft die Pflichtfelder
    fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(app_id) = lookup("CALL_APP_ID") {
            self.app_id = app_id;
        }
        if let Some(channel) = lookup("CALL_CHANNEL") {
            self.default_channel = channel;
        }
        if let Some(token) = lookup("CALL_TOKEN") {
            self.credential = Some(Credential::new(token));
        }
        if let Some(filter) = lookup("CALL_LOG") {
            self.log_filter = filter;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::MissingAppId);
        }
        Ok(())
    }

    /// Ermittelt den Pfad zur Config-Datei
    fn config_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("", "", "group-call")
            .ok_or(ConfigError::NoConfigDir)?;

        let mut path = proj_dirs.config_dir().to_path_buf();
        path.push(CONFIG_FILE);
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_read_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "appId": "abc123", "credential": "tok" }"#).unwrap();

        let config = CallConfig::read_file(&path)
            .unwrap()
            .with_env_overrides(env(&[]))
            .unwrap();

        assert_eq!(config.app_id, "abc123");
        assert_eq!(config.default_channel, DEFAULT_CHANNEL);
        assert_eq!(config.credential.unwrap().expose(), "tok");
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.audio_output, DEFAULT_AUDIO_OUTPUT);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = CallConfig::new("from-file")
            .with_env_overrides(env(&[
                ("CALL_APP_ID", "from-env"),
                ("CALL_CHANNEL", "room1"),
                ("CALL_TOKEN", "secret"),
            ]))
            .unwrap();

        assert_eq!(config.app_id, "from-env");
        assert_eq!(config.default_channel, "room1");
        assert!(config.credential.is_some());
    }

    #[test]
    fn test_missing_app_id_is_rejected() {
        let result = CallConfig::default().with_env_overrides(env(&[]));

        assert!(matches!(result, Err(ConfigError::MissingAppId)));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            CallConfig::read_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
