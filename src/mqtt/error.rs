//! Error definitions for the MQTT module

use std::time::Duration;

use thiserror::Error;

use super::topics::TopicError;

/// A single failed connection attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The broker answered the CONNECT with a non-zero return code
    #[error("Broker refused connection: {reason}")]
    Refused { code: i32, reason: String },

    /// No CONNACK within the connect timeout
    #[error("No answer from broker within {0:?}")]
    Timeout(Duration),

    /// Socket or protocol level failure
    #[error("Connection failed: {0}")]
    Io(String),
}

impl ConnectError {
    /// Reason code for logs: the broker's CONNACK code when refused,
    /// negative values for failures before a CONNACK arrived.
    pub fn reason_code(&self) -> i32 {
        match self {
            ConnectError::Refused { code, .. } => *code,
            ConnectError::Timeout(_) => -4,
            ConnectError::Io(_) => -2,
        }
    }
}

/// Errors of the broker session
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("No broker address configured")]
    MissingBroker,

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Not connected to broker")]
    NotConnected,
}
