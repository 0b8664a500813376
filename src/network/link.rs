//! Link state from `/sys/class/net`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::NetworkError;

pub const SYS_CLASS_NET: &str = "/sys/class/net";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Wireless,
    Wired,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Wireless => "wireless",
            LinkKind::Wired => "wired",
        }
    }
}

/// Tracks one interface of a given kind.
#[derive(Debug)]
pub struct LinkMonitor {
    root: PathBuf,
    kind: LinkKind,
    configured: Option<String>,
    active: Option<String>,
    connected: bool,
    /// Set while no interface could be selected
    unavailable: bool,
}

impl LinkMonitor {
    pub fn new(kind: LinkKind, configured: Option<String>) -> Self {
        Self::with_root(SYS_CLASS_NET, kind, configured)
    }

    pub fn with_root(root: impl Into<PathBuf>, kind: LinkKind, configured: Option<String>) -> Self {
        Self {
            root: root.into(),
            kind,
            configured,
            active: None,
            connected: false,
            unavailable: false,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Picks the interface to watch and reads its state once.
    pub fn select(&mut self) -> Result<(), NetworkError> {
        let interface = match &self.configured {
            Some(name) => {
                if !self.root.join(name).exists() {
                    return Err(NetworkError::InterfaceNotFound(name.clone()));
                }
                if self.classify(name) != self.kind {
                    warn!("Interface {} is not {}", name, self.kind.as_str());
                }
                name.clone()
            }
            None => self
                .scan()?
                .into_iter()
                .next()
                .ok_or(NetworkError::NoInterface(self.kind.as_str()))?,
        };

        info!("Using {} interface {}", self.kind.as_str(), interface);
        self.active = Some(interface);
        self.refresh();
        Ok(())
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// Selects an interface unless one is active. A missing interface is logged
    /// once, not on every call.
    pub fn ensure_selected(&mut self) -> bool {
        if self.active.is_some() {
            return true;
        }
        match self.select() {
            Ok(()) => {
                if self.unavailable {
                    info!("{} interface available again", self.kind.as_str());
                }
                self.unavailable = false;
                true
            }
            Err(e) => {
                if !self.unavailable {
                    warn!("No {} interface available: {}", self.kind.as_str(), e);
                }
                self.unavailable = true;
                false
            }
        }
    }

    /// Re-reads the operational state and logs transitions.
    pub fn refresh(&mut self) {
        let Some(interface) = self.active.as_deref() else {
            self.connected = false;
            return;
        };

        let up = match read_operstate(&self.root, interface) {
            Ok(state) => state == "up",
            Err(e) => {
                debug!("{}", e);
                false
            }
        };

        if up != self.connected {
            if up {
                info!("Link {} up", interface);
            } else {
                warn!("Link {} down", interface);
            }
        }
        self.connected = up;
    }

    /// Candidate interfaces of this kind, sorted by name. Loopback is never a candidate.
    fn scan(&self) -> Result<Vec<String>, NetworkError> {
        let entries = fs::read_dir(&self.root).map_err(|source| NetworkError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != "lo")
            .filter(|name| self.classify(name) == self.kind)
            .collect();
        names.sort();
        Ok(names)
    }

    fn classify(&self, interface: &str) -> LinkKind {
        if self.root.join(interface).join("wireless").is_dir() {
            LinkKind::Wireless
        } else {
            LinkKind::Wired
        }
    }
}

fn read_operstate(root: &Path, interface: &str) -> Result<String, NetworkError> {
    let path = root.join(interface).join("operstate");
    fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|source| NetworkError::Io { path, source })
}
