//! # Lock Module
//!
//! Everything on the device side of the bridge.
//!
//! ```text
//! lock/
//! ├── state.rs      - Snapshot, battery report, configuration and action types
//! ├── device.rs     - DeviceSession boundary towards the radio
//! ├── simulated.rs  - In-memory DeviceSession
//! ├── engine.rs     - Synchronization engine (diffing, schedules, command slot)
//! └── error.rs      - DeviceError / LockError
//! ```
//!
//! The engine never talks to the broker client directly. It publishes through
//! [`engine::StatePublisher`] and receives inbound messages through
//! [`crate::mqtt::mqtt_handler::InboundHandler`]; the bridge wires both ends.

pub mod device;
pub mod engine;
pub mod error;
pub mod simulated;
pub mod state;
