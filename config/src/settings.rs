//! Application settings management

use crate::{ConfigError, ModelProfile, PathManager, BASE_URL_ENV};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Application settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Model profile selected at startup
    pub default_profile: ModelProfile,
    /// Sampling temperature sent with every request
    pub temperature: f64,
    /// Number of past exchanges (user + model pairs) sent upstream
    pub max_turns: usize,
    pub request_timeout_secs: u64,
    /// Upper bound for consuming one streamed response
    pub stream_timeout_secs: u64,
    /// Upstream base URL; `GEMINI_BASE_URL` takes precedence
    pub base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_profile: ModelProfile::Fast,
            temperature: 0.7,
            max_turns: 10,
            request_timeout_secs: 60,
            stream_timeout_secs: 120,
            base_url: None,
        }
    }
}

impl Settings {
    /// Load settings from the settings file, or return defaults if there is none.
    /// Applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match PathManager::settings_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                settings.base_url = Some(url.trim().to_string());
            }
        }
        Ok(settings)
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(?path, "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::ReadSettings {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_turns, 10);
        assert_eq!(settings.temperature, 0.7);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_profile = \"accurate\"\nmax_turns = 4").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.default_profile, ModelProfile::Accurate);
        assert_eq!(settings.max_turns, 4);
        assert_eq!(settings.stream_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn malformed_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_turns = \"many\"").unwrap();

        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings { .. }));
    }
}
