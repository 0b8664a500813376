use serde::{Deserialize, Serialize};

use super::topics::DEFAULT_LOCK_PATH;

pub const DEFAULT_PORT: u16 = 1883;

/// Broker connection settings as persisted in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or address
    pub broker: String,
    pub port: u16,
    /// Empty user means an anonymous connection
    pub user: String,
    pub password: String,
    /// Namespace prefix for every topic
    pub lock_path: String,
    /// Home Assistant discovery root; empty disables discovery
    pub discovery_topic: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    /// How long one pump waits for inbound traffic
    pub poll_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            lock_path: DEFAULT_LOCK_PATH.to_string(),
            discovery_topic: String::new(),
            keep_alive_secs: 60,
            connect_timeout_ms: 3000,
            poll_timeout_ms: 20,
        }
    }
}

impl MqttConfig {
    /// `(user, password)` when a user name is configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.user.is_empty() {
            None
        } else {
            Some((self.user.clone(), self.password.clone()))
        }
    }

    /// Replaces unset values with their defaults. Returns true if anything changed.
    pub fn apply_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.port == 0 {
            self.port = DEFAULT_PORT;
            changed = true;
        }
        if self.lock_path.is_empty() {
            self.lock_path = DEFAULT_LOCK_PATH.to_string();
            changed = true;
        }
        changed
    }
}
