//! Settings file: `~/.config/nukihub/config.toml` unless given on the command line.
//!
//! A missing file is created with defaults, and values that are unset or out of
//! range are normalized and written back on load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lock::engine::{
    LockSettings, COMMAND_SETTLE_MS, CONFIG_INTERVAL_SECS, LOCK_STATE_INTERVAL_SECS,
};
use crate::mqtt::config::MqttConfig;
use crate::network::config::NetworkConfig;

const CONFIG_DIR: &str = ".config/nukihub";
const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_HOSTNAME: &str = "nukihub";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// MQTT client id
    pub hostname: String,
    pub network: NetworkConfig,
    pub mqtt: MqttConfig,
    pub lock: LockDeviceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            network: NetworkConfig::default(),
            mqtt: MqttConfig::default(),
            lock: LockDeviceConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LockDeviceConfig {
    /// Display name used in discovery documents
    pub name: String,
    /// Unique id used in discovery paths
    pub device_id: String,
    pub lock_state_interval_secs: u64,
    /// 0 means thirty lock state periods
    pub battery_interval_secs: u64,
    pub config_interval_secs: u64,
    pub command_settle_ms: u64,
}

impl Default for LockDeviceConfig {
    fn default() -> Self {
        Self {
            name: "Nuki".to_string(),
            device_id: DEFAULT_HOSTNAME.to_string(),
            lock_state_interval_secs: LOCK_STATE_INTERVAL_SECS,
            battery_interval_secs: 0,
            config_interval_secs: CONFIG_INTERVAL_SECS,
            command_settle_ms: COMMAND_SETTLE_MS,
        }
    }
}

impl LockDeviceConfig {
    pub fn settings(&self) -> LockSettings {
        let lock_state_interval = Duration::from_secs(self.lock_state_interval_secs);
        let battery_interval = if self.battery_interval_secs == 0 {
            lock_state_interval * 30
        } else {
            Duration::from_secs(self.battery_interval_secs)
        };
        LockSettings {
            lock_state_interval,
            battery_interval,
            config_interval: Duration::from_secs(self.config_interval_secs),
            command_settle_delay: Duration::from_millis(self.command_settle_ms),
        }
    }

    fn apply_defaults(&mut self) -> bool {
        let defaults = Self::default();
        let mut changed = false;
        if self.name.is_empty() {
            self.name = defaults.name;
            changed = true;
        }
        if self.device_id.is_empty() {
            self.device_id = defaults.device_id;
            changed = true;
        }
        if self.lock_state_interval_secs == 0 {
            self.lock_state_interval_secs = defaults.lock_state_interval_secs;
            changed = true;
        }
        if self.config_interval_secs == 0 {
            self.config_interval_secs = defaults.config_interval_secs;
            changed = true;
        }
        changed
    }
}

impl Config {
    /// Normalizes unset values. Returns true if the file needs rewriting.
    pub fn apply_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.hostname.is_empty() {
            self.hostname = DEFAULT_HOSTNAME.to_string();
            changed = true;
        }
        // No short-circuit, every section gets normalized
        changed |= self.network.apply_defaults();
        changed |= self.mqtt.apply_defaults();
        changed |= self.lock.apply_defaults();
        changed
    }

    pub async fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No settings at {}, writing defaults", path.display());
            let config = Config::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded settings from {}", path.display());

        if config.apply_defaults() {
            info!("Writing normalized settings back to {}", path.display());
            config.save(path).await?;
        }
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await.map_err(io_err)
    }
}

pub fn default_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Home directory unknown, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::config::{NetworkDeviceType, TIMEOUT_DISABLED};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_or_init(&path).await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.hostname, "nukihub");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.lock_path, "nuki");
        assert_eq!(config.network.timeout_secs, TIMEOUT_DISABLED);

        let reloaded = Config::load_or_init(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn unset_values_are_normalized_and_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
hostname = ""

[network]
device = "wired"
timeout_secs = 0

[mqtt]
broker = "10.0.0.2"
port = 0
lock_path = ""
"#,
        )
        .await
        .unwrap();

        let config = Config::load_or_init(&path).await.unwrap();
        assert_eq!(config.hostname, "nukihub");
        assert_eq!(config.network.device, NetworkDeviceType::Wired);
        assert_eq!(config.network.timeout_secs, TIMEOUT_DISABLED);
        assert_eq!(config.mqtt.broker, "10.0.0.2");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.lock_path, "nuki");

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let on_disk: Config = toml::from_str(&written).unwrap();
        assert_eq!(on_disk, config);
    }

    #[tokio::test]
    async fn broken_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[mqtt\nbroker = ").await.unwrap();
        assert!(matches!(
            Config::load_or_init(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn battery_interval_follows_lock_state_interval() {
        let lock = LockDeviceConfig {
            lock_state_interval_secs: 10,
            ..Default::default()
        };
        let settings = lock.settings();
        assert_eq!(settings.battery_interval, Duration::from_secs(300));
        assert_eq!(settings.command_settle_delay, Duration::from_millis(11_000));

        let defaults = LockDeviceConfig::default().settings();
        assert_eq!(defaults.battery_interval, Duration::from_secs(1800));
    }

    #[test]
    fn default_lock_section_matches_engine_defaults() {
        assert_eq!(LockDeviceConfig::default().settings(), LockSettings::default());

        let lock = LockDeviceConfig {
            command_settle_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(
            lock.settings().command_settle_delay,
            Duration::from_millis(u64::MAX)
        );
    }

    #[test]
    fn default_path_is_under_home() {
        assert!(default_path().ends_with(".config/nukihub/config.toml"));
    }
}
