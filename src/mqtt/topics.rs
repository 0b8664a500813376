//! Logical topic names and the namespace that turns them into broker paths.
//!
//! Every topic the bridge touches is `{prefix}{logical}`. [`TopicNamespace::build_path`]
//! is the only place that concatenation happens, and inbound matching goes through
//! the very same function so a comparison is always exact string equality.

use thiserror::Error;

/// Upper bound for a fully namespaced topic, in bytes.
pub const MAX_TOPIC_LEN: usize = 200;

/// Prefix used when the settings carry none.
pub const DEFAULT_LOCK_PATH: &str = "nuki";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic '{topic}' is {len} bytes long, limit is {max}")]
    TooLong {
        topic: String,
        len: usize,
        max: usize,
    },

    #[error("Invalid namespace prefix '{prefix}': {reason}")]
    InvalidPrefix {
        prefix: String,
        reason: &'static str,
    },
}

/// Logical topics, relative to the namespace prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    LockAction,
    LockState,
    LockTrigger,
    LockCompletionStatus,
    DoorSensorState,
    BatteryCritical,
    BatteryCharging,
    BatteryLevel,
    BatteryVoltage,
    BatteryDrain,
    BatteryMaxTurnCurrent,
    BatteryLockDistance,
    AuthId,
    AuthName,
    CommandResult,
    Presence,
    ConfigButtonEnabled,
    ConfigLedEnabled,
    ConfigLedBrightness,
    ConfigAutoUnlock,
    ConfigAutoLock,
}

impl Topic {
    pub const ALL: [Topic; 21] = [
        Topic::LockAction,
        Topic::LockState,
        Topic::LockTrigger,
        Topic::LockCompletionStatus,
        Topic::DoorSensorState,
        Topic::BatteryCritical,
        Topic::BatteryCharging,
        Topic::BatteryLevel,
        Topic::BatteryVoltage,
        Topic::BatteryDrain,
        Topic::BatteryMaxTurnCurrent,
        Topic::BatteryLockDistance,
        Topic::AuthId,
        Topic::AuthName,
        Topic::CommandResult,
        Topic::Presence,
        Topic::ConfigButtonEnabled,
        Topic::ConfigLedEnabled,
        Topic::ConfigLedBrightness,
        Topic::ConfigAutoUnlock,
        Topic::ConfigAutoLock,
    ];

    /// Configuration topics, subscribed as a group and in this order.
    pub const CONFIG: [Topic; 5] = [
        Topic::ConfigButtonEnabled,
        Topic::ConfigLedEnabled,
        Topic::ConfigLedBrightness,
        Topic::ConfigAutoUnlock,
        Topic::ConfigAutoLock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::LockAction => "/lock/action",
            Topic::LockState => "/lock/state",
            Topic::LockTrigger => "/lock/trigger",
            Topic::LockCompletionStatus => "/lock/completionStatus",
            Topic::DoorSensorState => "/lock/doorSensorState",
            Topic::BatteryCritical => "/battery/critical",
            Topic::BatteryCharging => "/battery/charging",
            Topic::BatteryLevel => "/battery/level",
            Topic::BatteryVoltage => "/battery/voltage",
            Topic::BatteryDrain => "/battery/drain",
            Topic::BatteryMaxTurnCurrent => "/battery/maxTurnCurrent",
            Topic::BatteryLockDistance => "/battery/lockDistance",
            Topic::AuthId => "/lock/authorizationId",
            Topic::AuthName => "/lock/authorizationName",
            Topic::CommandResult => "/lock/commandResult",
            Topic::Presence => "/presence/devices",
            Topic::ConfigButtonEnabled => "/configuration/buttonEnabled",
            Topic::ConfigLedEnabled => "/configuration/ledEnabled",
            Topic::ConfigLedBrightness => "/configuration/ledBrightness",
            Topic::ConfigAutoUnlock => "/configuration/autoUnlock",
            Topic::ConfigAutoLock => "/configuration/autoLock",
        }
    }

    pub fn is_config(self) -> bool {
        Topic::CONFIG.contains(&self)
    }

    fn longest() -> usize {
        Topic::ALL
            .iter()
            .map(|t| t.as_str().len())
            .max()
            .unwrap_or_default()
    }
}

/// The configured path segment in front of every logical topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    prefix: String,
}

impl Default for TopicNamespace {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_LOCK_PATH.to_string(),
        }
    }
}

impl TopicNamespace {
    /// Validates `prefix`; an empty prefix falls back to [`DEFAULT_LOCK_PATH`].
    pub fn new(prefix: &str) -> Result<Self, TopicError> {
        let prefix = if prefix.is_empty() {
            DEFAULT_LOCK_PATH
        } else {
            prefix
        };

        if prefix.contains(['+', '#']) {
            return Err(TopicError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "wildcards are not allowed",
            });
        }
        if prefix.contains('\0') {
            return Err(TopicError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "NUL is not allowed",
            });
        }
        // Every logical topic has to fit, otherwise we'd find out only at publish time.
        let longest = prefix.len() + Topic::longest();
        if longest > MAX_TOPIC_LEN {
            return Err(TopicError::TooLong {
                topic: prefix.to_string(),
                len: longest,
                max: MAX_TOPIC_LEN,
            });
        }

        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn build_path(&self, topic: Topic) -> Result<String, TopicError> {
        self.build_raw(topic.as_str())
    }

    /// Concatenates prefix and `logical`, rejecting results over [`MAX_TOPIC_LEN`].
    pub fn build_raw(&self, logical: &str) -> Result<String, TopicError> {
        let mut path = String::with_capacity(self.prefix.len() + logical.len());
        path.push_str(&self.prefix);
        path.push_str(logical);

        if path.len() > MAX_TOPIC_LEN {
            return Err(TopicError::TooLong {
                len: path.len(),
                topic: path,
                max: MAX_TOPIC_LEN,
            });
        }
        Ok(path)
    }

    pub fn matches(&self, full_path: &str, topic: Topic) -> bool {
        self.build_path(topic)
            .map(|path| path == full_path)
            .unwrap_or(false)
    }

    /// Maps a broker path back to its logical topic.
    pub fn resolve(&self, full_path: &str) -> Option<Topic> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| self.matches(full_path, *topic))
    }
}
