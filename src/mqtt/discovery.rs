//! Home Assistant discovery documents.
//!
//! Discovery paths live under their own root and are not namespaced by the lock
//! prefix; the `~` key carries the prefix instead.

use serde_json::{json, Value};

use super::topics::{Topic, TopicError, TopicNamespace, MAX_TOPIC_LEN};

/// Device description behind the two discovery documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryInfo {
    pub device_type: String,
    pub base_topic: String,
    pub name: String,
    pub uid: String,
    pub lock_action: String,
    pub unlock_action: String,
    pub open_action: String,
    pub locked_state: String,
    pub unlocked_state: String,
}

impl DiscoveryInfo {
    /// Smart lock entity with the usual action and state literals.
    pub fn smart_lock(namespace: &TopicNamespace, name: &str, uid: &str) -> Self {
        Self {
            device_type: "SmartLock".to_string(),
            base_topic: namespace.prefix().to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            lock_action: "lock".to_string(),
            unlock_action: "unlock".to_string(),
            open_action: "unlatch".to_string(),
            locked_state: "locked".to_string(),
            unlocked_state: "unlocked".to_string(),
        }
    }

    fn device(&self) -> Value {
        json!({
            "ids": [format!("nuki_{}", self.uid)],
            "mf": "Nuki",
            "mdl": self.device_type,
            "name": self.name,
        })
    }

    pub fn lock_document(&self) -> Value {
        json!({
            "dev": self.device(),
            "~": self.base_topic,
            "name": self.name,
            "unique_id": format!("{}_lock", self.uid),
            "cmd_t": format!("~{}", Topic::LockAction.as_str()),
            "pl_lock": self.lock_action,
            "pl_unlk": self.unlock_action,
            "pl_open": self.open_action,
            "stat_t": format!("~{}", Topic::LockState.as_str()),
            "stat_locked": self.locked_state,
            "stat_unlocked": self.unlocked_state,
            "opt": "false",
        })
    }

    pub fn battery_document(&self) -> Value {
        json!({
            "dev": self.device(),
            "~": self.base_topic,
            "name": format!("{} battery low", self.name),
            "unique_id": format!("{}_battery_low", self.uid),
            "dev_cla": "battery",
            "ent_cat": "diagnostic",
            "pl_off": "0",
            "pl_on": "1",
            "stat_t": format!("~{}", Topic::BatteryCritical.as_str()),
        })
    }
}

fn checked(path: String) -> Result<String, TopicError> {
    if path.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong {
            len: path.len(),
            topic: path,
            max: MAX_TOPIC_LEN,
        });
    }
    Ok(path)
}

pub fn lock_config_path(root: &str, uid: &str) -> Result<String, TopicError> {
    checked(format!("{}/lock/{}/smartlock/config", root, uid))
}

pub fn battery_config_path(root: &str, uid: &str) -> Result<String, TopicError> {
    checked(format!("{}/binary_sensor/{}/battery_low/config", root, uid))
}

/// `(path, document)` pairs to publish retained under `root`.
pub fn documents(root: &str, info: &DiscoveryInfo) -> Result<Vec<(String, Value)>, TopicError> {
    Ok(vec![
        (lock_config_path(root, &info.uid)?, info.lock_document()),
        (battery_config_path(root, &info.uid)?, info.battery_document()),
    ])
}

/// Paths that get an empty retained payload on removal.
pub fn removal_paths(root: &str, uid: &str) -> Result<Vec<String>, TopicError> {
    Ok(vec![
        lock_config_path(root, uid)?,
        battery_config_path(root, uid)?,
    ])
}
