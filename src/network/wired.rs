use rumqttc::Transport;

use super::link::{LinkKind, LinkMonitor};
use super::{NetworkDevice, NetworkError};

/// Ethernet adapter.
#[derive(Debug)]
pub struct WiredDevice {
    link: LinkMonitor,
}

impl WiredDevice {
    pub fn new(interface: Option<String>) -> Self {
        Self {
            link: LinkMonitor::new(LinkKind::Wired, interface),
        }
    }

    #[cfg(test)]
    pub fn with_root(root: impl Into<std::path::PathBuf>, interface: Option<String>) -> Self {
        Self {
            link: LinkMonitor::with_root(root, LinkKind::Wired, interface),
        }
    }
}

impl NetworkDevice for WiredDevice {
    fn name(&self) -> &str {
        "wired"
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

    // Nothing to renegotiate on a cable, only re-read the link.
    fn reconnect(&mut self) -> bool {
        if !self.link.ensure_selected() {
            return false;
        }
        self.link.refresh();
        self.link.is_connected()
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }
}
