use crate::core::error::{StoreError, StoreResult};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const KEY_VAR: &str = "SUPABASE_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Fixed channel value written to every row
    pub channel: String,
    pub timeout_secs: u64,
    pub channel_buffer_size: usize,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            channel: "whatsapp".to_string(),
            timeout_secs: 30,
            channel_buffer_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());
        let remote = RemoteConfig::default();

        let config = Config::builder()
            .set_default("store.backend", "remote")?
            .set_default("remote.channel", remote.channel)?
            .set_default("remote.timeout_secs", remote.timeout_secs)?
            .set_default("remote.channel_buffer_size", remote.channel_buffer_size as u64)?
            .set_default("local.path", "store/messages.db")?
            .set_default("logging.level", "info")?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("CHATRELAY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

/// Access settings for the remote store, read once at construction
#[derive(Clone)]
pub struct RemoteCredentials {
    pub url: String,
    pub key: String,
}

impl RemoteCredentials {
    /// Both values are required; a missing or empty one fails immediately
    pub fn new(url: Option<String>, key: Option<String>) -> StoreResult<Self> {
        match (
            url.filter(|v| !v.trim().is_empty()),
            key.filter(|v| !v.trim().is_empty()),
        ) {
            (Some(url), Some(key)) => Ok(Self { url, key }),
            _ => Err(StoreError::Config(format!(
                "{} and {} environment variables are required",
                URL_VAR, KEY_VAR
            ))),
        }
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(env::var(URL_VAR).ok(), env::var(KEY_VAR).ok())
    }
}

// keeps the key out of logs
impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url)
            .field("key", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url_fails() {
        let err = RemoteCredentials::new(None, Some("key".to_string())).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_missing_key_fails() {
        let err = RemoteCredentials::new(Some("https://db.example".to_string()), None).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let result = RemoteCredentials::new(Some("".to_string()), Some("  ".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let creds =
            RemoteCredentials::new(Some("https://db.example".to_string()), Some("secret".to_string()))
                .unwrap();
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("db.example"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.remote.timeout_secs, 30);
        assert_eq!(settings.remote.channel, "whatsapp");
    }
}
