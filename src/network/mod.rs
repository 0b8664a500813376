//! # Network Module
//!
//! Transport adapters the broker session runs on top of.
//!
//! ```text
//! network/
//! ├── config.rs  - NetworkConfig / NetworkDeviceType
//! ├── link.rs    - Link state read from the kernel's interface table
//! ├── wifi.rs    - Wireless adapter
//! └── wired.rs   - Ethernet adapter
//! ```
//!
//! The adapter is picked once at startup by [`create_device`] and then owned by
//! [`crate::mqtt::mqtt_handler::MqttHandler`].

pub mod config;
pub mod link;
pub mod wifi;
pub mod wired;

use std::path::PathBuf;

use rumqttc::Transport;
use thiserror::Error;

use self::config::{NetworkConfig, NetworkDeviceType};
use self::wifi::WifiDevice;
use self::wired::WiredDevice;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("No {0} interface available")]
    NoInterface(&'static str),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Capability set of a network transport.
pub trait NetworkDevice: Send {
    fn name(&self) -> &str;

    fn initialize(&mut self) -> Result<(), NetworkError>;

    /// Refreshes the link state; called once per loop iteration.
    fn update(&mut self);

    fn is_connected(&self) -> bool;

    /// Tries to bring the link back. Returns whether it is up afterwards.
    fn reconnect(&mut self) -> bool;

    /// Socket type handed to the broker client.
    fn transport(&self) -> Transport;
}

pub fn create_device(config: &NetworkConfig) -> Box<dyn NetworkDevice> {
    let interface = (!config.interface.is_empty()).then(|| config.interface.clone());
    match config.device {
        NetworkDeviceType::Wifi => Box::new(WifiDevice::new(interface)),
        NetworkDeviceType::Wired => Box::new(WiredDevice::new(interface)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_selects_adapter() {
        let wifi = create_device(&NetworkConfig::default());
        assert_eq!(wifi.name(), "wifi");

        let wired = create_device(&NetworkConfig {
            device: NetworkDeviceType::Wired,
            ..Default::default()
        });
        assert_eq!(wired.name(), "wired");
        assert!(!wired.is_connected());
    }
}
