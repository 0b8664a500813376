use std::fmt::Debug;

use super::error::DeviceError;
use super::state::{
    AdvancedConfig, AuthorizationInfo, BatteryReport, CommandResult, ConfigUpdate,
    KeyTurnerState, LockAction, LockConfig,
};

/// Request/response exchange with the physical lock.
///
/// Pairing and the encrypted radio handshake live behind this trait. Only the
/// synchronization engine calls it; every call is expected to be bounded by the
/// implementation's own exchange timeout.
pub trait DeviceSession: Debug + Send {
    /// Runs the pairing handshake. Safe to call again until it succeeds.
    fn pair(&mut self) -> bool;

    fn read_state(&mut self) -> Result<KeyTurnerState, DeviceError>;

    fn read_battery(&mut self) -> Result<BatteryReport, DeviceError>;

    fn send_action(
        &mut self,
        action: LockAction,
        param1: u32,
        param2: u8,
    ) -> Result<CommandResult, DeviceError>;

    fn read_config(&mut self) -> Result<LockConfig, DeviceError>;

    fn read_advanced_config(&mut self) -> Result<AdvancedConfig, DeviceError>;

    fn write_config_value(&mut self, update: ConfigUpdate) -> Result<(), DeviceError>;

    /// Identity behind the most recent lock action, if the device keeps a log.
    fn last_authorization(&mut self) -> Result<Option<AuthorizationInfo>, DeviceError>;
}
