//! Bridge configuration: broker endpoint, topic and timing knobs.
//!
//! Loaded from `~/.config/sipmq/config.toml` when present; every field has
//! a default so a missing or partial file still yields a usable setup.

use crate::protocol::topic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/sipmq";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse failure: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize failure: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid topic {0:?}: wildcards and empty names are not allowed")]
    InvalidTopic(String),
    #[error("client id must not be empty")]
    EmptyClientId,
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub broker_host: String,
    pub broker_port: u16,
    /// Topic for outbound event publishes; the inbound subscription uses
    /// the same name, so it must be a concrete topic without wildcards.
    pub topic: String,
    pub client_id: String,
    /// Ping period for the broker session, must be non-zero.
    pub keepalive_seconds: u16,
    pub tick_interval_ms: u64,
    pub poll_window_ms: u64,
    /// Lets inbound messages with a leading `/` run host commands. Anyone
    /// who can publish on the topic can execute commands through this, so
    /// it stays off unless the broker is trusted.
    pub command_relay: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            topic: "sipmq".to_string(),
            client_id: "sipmq".to_string(),
            keepalive_seconds: 60,
            tick_interval_ms: 500,
            poll_window_ms: 50,
            command_relay: false,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !topic::valid_topic(&self.topic) {
            return Err(ConfigError::InvalidTopic(self.topic.clone()));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if self.keepalive_seconds == 0 {
            return Err(ConfigError::ZeroInterval("keepalive_seconds"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("tick_interval_ms"));
        }
        if self.poll_window_ms == 0 {
            return Err(ConfigError::ZeroInterval("poll_window_ms"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_window(&self) -> Duration {
        Duration::from_millis(self.poll_window_ms)
    }

    pub fn config_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        let raw = tokio::fs::read_to_string(&path).await?;
        let config: BridgeConfig = toml::from_str(&raw)?;
        config.validate()?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    pub async fn load_or_default() -> Self {
        match Self::load().await {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no configuration file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("configuration unusable ({}), using defaults", e);
                Self::default()
            }
        }
    }

    pub async fn save(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            if !tokio::fs::try_exists(dir).await? {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&path, content).await?;
        info!("configuration saved to {}", path.display());
        Ok(())
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("home directory unknown, falling back to the current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.broker_host, "127.0.0.1");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.topic, "sipmq");
        assert!(!config.command_relay);
    }

    #[test]
    fn wildcard_topic_is_rejected() {
        let config = BridgeConfig {
            topic: "phone/#".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTopic(_))
        ));
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let config = BridgeConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval("tick_interval_ms"))
        ));
    }

    #[test]
    fn zero_keepalive_is_rejected() {
        let config = BridgeConfig {
            keepalive_seconds: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval("keepalive_seconds"))
        ));
    }

    #[test]
    fn partial_file_fills_missing_fields_from_defaults() {
        let config: BridgeConfig = toml::from_str("broker_host = \"10.0.0.5\"").unwrap();
        assert_eq!(config.broker_host, "10.0.0.5");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.keepalive_seconds, 60);
    }

    #[test]
    fn serializes_and_reloads_unchanged() {
        let config = BridgeConfig {
            broker_host: "broker.lan".to_string(),
            command_relay: true,
            ..Default::default()
        };
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reloaded: BridgeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(config, reloaded);
    }
}
