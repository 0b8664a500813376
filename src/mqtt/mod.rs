//! # MQTT Integration Module
//!
//! Broker side of the bridge: one session towards the broker, every topic under
//! a single configurable prefix, and routing of inbound messages to the lock.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and defaults
//! ├── topics.rs           - Logical topics and the namespace that builds full paths
//! ├── client.rs           - BrokerClient boundary, rumqttc implementation
//! ├── message_manager.rs  - Inbound message representation
//! ├── mqtt_handler.rs     - Session manager: backoff, subscriptions, publish, dispatch
//! ├── discovery.rs        - Home Assistant discovery documents
//! └── error.rs            - ConnectError / MqttError
//! ```
//!
//! ## Session Lifecycle
//!
//! [`mqtt_handler::MqttHandler::ensure_connected`] makes at most one attempt per
//! call and waits a fixed five seconds after a failure. A successful connect
//! subscribes the command topic and the five configuration topics again, so a
//! dropped session recovers its subscriptions without outside help.
//!
//! ## Command Acknowledgment
//!
//! Replies to commands go to the command topic itself. The session therefore
//! receives its own `ack` / `unknown_action` back and ignores them, as well as
//! empty payloads used to clear a retained command.

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;
pub mod topics;
