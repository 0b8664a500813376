use rumqttc::Transport;
use tracing::info;

use super::link::{LinkKind, LinkMonitor};
use super::{NetworkDevice, NetworkError};

/// Wireless adapter. The association itself is managed by the host; this
/// adapter watches the link and re-selects an interface when it disappears.
#[derive(Debug)]
pub struct WifiDevice {
    link: LinkMonitor,
}

impl WifiDevice {
    pub fn new(interface: Option<String>) -> Self {
        Self {
            link: LinkMonitor::new(LinkKind::Wireless, interface),
        }
    }

    #[cfg(test)]
    pub fn with_root(root: impl Into<std::path::PathBuf>, interface: Option<String>) -> Self {
        Self {
            link: LinkMonitor::with_root(root, LinkKind::Wireless, interface),
        }
    }
}

impl NetworkDevice for WifiDevice {
    fn name(&self) -> &str {
        "wifi"
    }

    fn initialize(&mut self) -> Result<(), NetworkError> {
        self.link.select()
    }

    fn update(&mut self) {
        self.link.refresh();
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn reconnect(&mut self) -> bool {
        if !self.link.ensure_selected() {
            return false;
        }
        self.link.refresh();
        if self.link.is_connected() {
            info!("Wifi reconnected");
        }
        self.link.is_connected()
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }
}
