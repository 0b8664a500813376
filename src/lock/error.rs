//! Error definitions for the lock module

use thiserror::Error;

/// Failures talking to the physical lock.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The lock did not answer within the exchange timeout
    #[error("Device timed out: {0}")]
    Timeout(String),

    /// Request issued before a successful pairing
    #[error("Device not paired")]
    NotPaired,

    /// The lock answered with an error code
    #[error("Device returned error code 0x{0:02x}")]
    ErrorCode(u8),

    /// Transport-level failure of the radio link
    #[error("Radio error: {0}")]
    Radio(String),
}

/// Errors of the synchronization engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Command string that does not map to a lock action
    #[error("Unknown lock action: {0}")]
    UnknownAction(String),

    /// Payload of a configuration topic that could not be parsed
    #[error("Invalid value '{value}' for {setting}")]
    InvalidConfigValue { setting: &'static str, value: String },

    /// Configuration write before the device configuration was read once
    #[error("Lock configuration not loaded yet")]
    ConfigNotLoaded,

    #[error(transparent)]
    Device(#[from] DeviceError),
}
