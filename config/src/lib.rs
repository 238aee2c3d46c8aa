pub mod paths;
pub mod profile;
pub mod settings;

pub use paths::PathManager;
pub use profile::ModelProfile;
pub use settings::Settings;

use std::path::PathBuf;

/// Environment variable holding the upstream API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable overriding the upstream base URL.
pub const BASE_URL_ENV: &str = "GEMINI_BASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} not found in environment variables")]
    MissingApiKey { var: &'static str },

    #[error("failed to read settings file {path:?}: {source}")]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path:?}: {source}")]
    InvalidSettings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load environment variables from ./.env and ~/.env.
/// Project directory values take precedence over home directory values, and
/// variables already set in the process environment win over both.
/// Call this before parsing CLI args to ensure env vars are available.
pub fn load_env_file() {
    // dotenv never overwrites an existing variable: first file loaded wins.
    dotenv::dotenv().ok();

    if let Some(dirs) = directories::BaseDirs::new() {
        dotenv::from_path(dirs.home_dir().join(".env")).ok();
    }
}

/// The upstream API secret. `Debug` never prints the key itself.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Read the key from `GEMINI_API_KEY`. A blank value counts as missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_value(std::env::var(API_KEY_ENV).ok())
    }

    fn from_value(value: Option<String>) -> Result<Self, ConfigError> {
        match value {
            Some(key) if !key.trim().is_empty() => Ok(ApiKey(key.trim().to_string())),
            _ => Err(ConfigError::MissingApiKey { var: API_KEY_ENV }),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(****)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_key_is_a_config_error() {
        assert!(matches!(
            ApiKey::from_value(None),
            Err(ConfigError::MissingApiKey { var: API_KEY_ENV })
        ));
        assert!(ApiKey::from_value(Some("   ".to_string())).is_err());
    }

    #[test]
    fn key_is_trimmed_and_hidden_from_debug() {
        let key = ApiKey::from_value(Some(" secret-key\n".to_string())).unwrap();
        assert_eq!(key.expose(), "secret-key");
        assert_eq!(format!("{:?}", key), "ApiKey(****)");
    }

    #[test]
    fn missing_key_message_names_the_variable() {
        let err = ApiKey::from_value(None).unwrap_err();
        assert_eq!(err.to_string(), "GEMINI_API_KEY not found in environment variables");
    }
}
