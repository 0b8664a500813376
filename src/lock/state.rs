use std::fmt;
use std::str::FromStr;

use super::error::LockError;

/// Position of the lock bolt as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    Uncalibrated,
    Locked,
    Unlocking,
    Unlocked,
    Locking,
    Unlatched,
    UnlockedLnga,
    Unlatching,
    Calibration,
    BootRun,
    MotorBlocked,
    #[default]
    Undefined,
}

impl LockState {
    pub fn as_str(self) -> &'static str {
        match self {
            LockState::Uncalibrated => "uncalibrated",
            LockState::Locked => "locked",
            LockState::Unlocking => "unlocking",
            LockState::Unlocked => "unlocked",
            LockState::Locking => "locking",
            LockState::Unlatched => "unlatched",
            LockState::UnlockedLnga => "unlockedLnga",
            LockState::Unlatching => "unlatching",
            LockState::Calibration => "calibration",
            LockState::BootRun => "bootRun",
            LockState::MotorBlocked => "motorBlocked",
            LockState::Undefined => "undefined",
        }
    }
}

/// What caused the last state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    System,
    Manual,
    Button,
    Automatic,
    AutoLock,
    #[default]
    Undefined,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::System => "system",
            Trigger::Manual => "manual",
            Trigger::Button => "button",
            Trigger::Automatic => "automatic",
            Trigger::AutoLock => "autoLock",
            Trigger::Undefined => "undefined",
        }
    }
}

/// Outcome of the last lock action the motor executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionStatus {
    Success,
    MotorBlocked,
    Canceled,
    TooRecent,
    Busy,
    LowMotorVoltage,
    ClutchFailure,
    MotorPowerFailure,
    IncompleteFailure,
    OtherError,
    #[default]
    Unknown,
}

impl CompletionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::Success => "success",
            CompletionStatus::MotorBlocked => "motorBlocked",
            CompletionStatus::Canceled => "canceled",
            CompletionStatus::TooRecent => "tooRecent",
            CompletionStatus::Busy => "busy",
            CompletionStatus::LowMotorVoltage => "lowMotorVoltage",
            CompletionStatus::ClutchFailure => "clutchFailure",
            CompletionStatus::MotorPowerFailure => "motorPowerFailure",
            CompletionStatus::IncompleteFailure => "incompleteFailure",
            CompletionStatus::OtherError => "otherError",
            CompletionStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoorSensorState {
    Unavailable,
    Deactivated,
    DoorClosed,
    DoorOpened,
    DoorStateUnknown,
    Calibrating,
    #[default]
    Undefined,
}

impl DoorSensorState {
    pub fn as_str(self) -> &'static str {
        match self {
            DoorSensorState::Unavailable => "unavailable",
            DoorSensorState::Deactivated => "deactivated",
            DoorSensorState::DoorClosed => "doorClosed",
            DoorSensorState::DoorOpened => "doorOpened",
            DoorSensorState::DoorStateUnknown => "doorStateUnknown",
            DoorSensorState::Calibrating => "calibrating",
            DoorSensorState::Undefined => "undefined",
        }
    }
}

/// Point-in-time mirror of the device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyTurnerState {
    pub lock_state: LockState,
    pub trigger: Trigger,
    pub completion_status: CompletionStatus,
    pub door_sensor_state: DoorSensorState,
    pub battery_critical: bool,
    pub battery_charging: bool,
    pub battery_level: u8,
}

impl KeyTurnerState {
    /// Unpacks the device's battery byte: bit 0 critical, bit 1 charging,
    /// bits 2..8 the level in steps of two percent.
    pub fn with_critical_battery_state(mut self, raw: u8) -> Self {
        self.battery_critical = raw & 0b0000_0001 > 0;
        self.battery_charging = raw & 0b0000_0010 > 0;
        self.battery_level = (raw & 0b1111_1100) >> 1;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryReport {
    /// Millivolts
    pub voltage_mv: u16,
    /// Milliwatt seconds
    pub drain_mws: u32,
    /// Milliamperes
    pub max_turn_current_ma: u16,
    /// Degrees
    pub lock_distance: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockConfig {
    pub button_enabled: bool,
    pub led_enabled: bool,
    pub led_brightness: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvancedConfig {
    pub auto_unlock_enabled: bool,
    pub auto_lock_enabled: bool,
}

/// Who performed the most recent action on the lock.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorizationInfo {
    pub id: u32,
    pub name: String,
}

/// Actions the lock accepts, with their device-level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    Unlock,
    Lock,
    Unlatch,
    LockNgo,
    LockNgoUnlatch,
    FullLock,
    FobAction1,
    FobAction2,
    FobAction3,
}

impl LockAction {
    pub fn code(self) -> u8 {
        match self {
            LockAction::Unlock => 0x01,
            LockAction::Lock => 0x02,
            LockAction::Unlatch => 0x03,
            LockAction::LockNgo => 0x04,
            LockAction::LockNgoUnlatch => 0x05,
            LockAction::FullLock => 0x06,
            LockAction::FobAction1 => 0x81,
            LockAction::FobAction2 => 0x82,
            LockAction::FobAction3 => 0x83,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockAction::Unlock => "unlock",
            LockAction::Lock => "lock",
            LockAction::Unlatch => "unlatch",
            LockAction::LockNgo => "lockNgo",
            LockAction::LockNgoUnlatch => "lockNgoUnlatch",
            LockAction::FullLock => "fullLock",
            LockAction::FobAction1 => "fobAction1",
            LockAction::FobAction2 => "fobAction2",
            LockAction::FobAction3 => "fobAction3",
        }
    }
}

impl FromStr for LockAction {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unlock" => Ok(LockAction::Unlock),
            "lock" => Ok(LockAction::Lock),
            "unlatch" => Ok(LockAction::Unlatch),
            "lockNgo" => Ok(LockAction::LockNgo),
            "lockNgoUnlatch" => Ok(LockAction::LockNgoUnlatch),
            "fullLock" => Ok(LockAction::FullLock),
            "fobAction1" => Ok(LockAction::FobAction1),
            "fobAction2" => Ok(LockAction::FobAction2),
            "fobAction3" => Ok(LockAction::FobAction3),
            other => Err(LockError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.as_str(), self.code())
    }
}

/// Result the device reports for a command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    Failed,
    TimeOut,
    Working,
    NotPaired,
    Error,
}

impl CommandResult {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandResult::Success => "success",
            CommandResult::Failed => "failed",
            CommandResult::TimeOut => "timeOut",
            CommandResult::Working => "working",
            CommandResult::NotPaired => "notPaired",
            CommandResult::Error => "error",
        }
    }
}

/// A single configuration value arriving from a configuration topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigUpdate {
    ButtonEnabled(bool),
    LedEnabled(bool),
    LedBrightness(u8),
    AutoUnlock(bool),
    AutoLock(bool),
}

impl ConfigUpdate {
    /// True when applying this update would leave the given configuration unchanged.
    pub fn is_noop(&self, config: &LockConfig, advanced: &AdvancedConfig) -> bool {
        match *self {
            ConfigUpdate::ButtonEnabled(v) => config.button_enabled == v,
            ConfigUpdate::LedEnabled(v) => config.led_enabled == v,
            ConfigUpdate::LedBrightness(v) => config.led_brightness == v,
            ConfigUpdate::AutoUnlock(v) => advanced.auto_unlock_enabled == v,
            ConfigUpdate::AutoLock(v) => advanced.auto_lock_enabled == v,
        }
    }

    pub fn apply(&self, config: &mut LockConfig, advanced: &mut AdvancedConfig) {
        match *self {
            ConfigUpdate::ButtonEnabled(v) => config.button_enabled = v,
            ConfigUpdate::LedEnabled(v) => config.led_enabled = v,
            ConfigUpdate::LedBrightness(v) => config.led_brightness = v,
            ConfigUpdate::AutoUnlock(v) => advanced.auto_unlock_enabled = v,
            ConfigUpdate::AutoLock(v) => advanced.auto_lock_enabled = v,
        }
    }
}

pub const MAX_LED_BRIGHTNESS: u8 = 5;

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
