use serde::{Deserialize, Serialize};

/// Stored as -1 when the watchdog is switched off.
pub const TIMEOUT_DISABLED: i64 = -1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkDeviceType {
    #[default]
    Wifi,
    Wired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub device: NetworkDeviceType,
    /// Interface name; empty picks the first matching one
    pub interface: String,
    /// Seconds without link before the process gives up; -1 disables
    pub timeout_secs: i64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            device: NetworkDeviceType::default(),
            interface: String::new(),
            timeout_secs: TIMEOUT_DISABLED,
        }
    }
}

impl NetworkConfig {
    /// A stored timeout of 0 means disabled and is written back as -1.
    pub fn apply_defaults(&mut self) -> bool {
        if self.timeout_secs == 0 {
            self.timeout_secs = TIMEOUT_DISABLED;
            return true;
        }
        false
    }
}
