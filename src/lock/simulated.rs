//! In-memory lock used when no radio is attached.
//!
//! Clones share one device, so a caller can keep a handle to inspect or steer
//! the lock after handing a clone to the engine.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::device::DeviceSession;
use super::error::DeviceError;
use super::state::{
    AdvancedConfig, AuthorizationInfo, BatteryReport, CommandResult, CompletionStatus,
    ConfigUpdate, DoorSensorState, KeyTurnerState, LockAction, LockConfig, LockState, Trigger,
};

const BRIDGE_AUTH_ID: u32 = 1;
const BRIDGE_AUTH_NAME: &str = "nukihub";

#[derive(Debug)]
struct SimulatedDevice {
    state: KeyTurnerState,
    battery: BatteryReport,
    config: LockConfig,
    advanced: AdvancedConfig,
    authorization: Option<AuthorizationInfo>,
    pair_after: u32,
    pair_attempts: u32,
    paired: bool,
    offline: bool,
    action_log: Vec<LockAction>,
    config_writes: Vec<ConfigUpdate>,
}

#[derive(Debug, Clone)]
pub struct SimulatedLock {
    inner: Arc<Mutex<SimulatedDevice>>,
}

impl Default for SimulatedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLock {
    pub fn new() -> Self {
        let state = KeyTurnerState {
            lock_state: LockState::Locked,
            trigger: Trigger::System,
            completion_status: CompletionStatus::Success,
            door_sensor_state: DoorSensorState::DoorClosed,
            ..Default::default()
        }
        .with_critical_battery_state(0b1100_1000);

        let device = SimulatedDevice {
            state,
            battery: BatteryReport {
                voltage_mv: 6120,
                drain_mws: 0,
                max_turn_current_ma: 270,
                lock_distance: 360,
            },
            config: LockConfig {
                button_enabled: true,
                led_enabled: true,
                led_brightness: 3,
            },
            advanced: AdvancedConfig::default(),
            authorization: None,
            pair_after: 1,
            pair_attempts: 0,
            paired: false,
            offline: false,
            action_log: Vec::new(),
            config_writes: Vec::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Pairing succeeds on the `attempts`-th call to `pair`.
    pub fn with_pairing_after(self, attempts: u32) -> Self {
        self.device().pair_after = attempts.max(1);
        self
    }

    pub fn set_state(&self, state: KeyTurnerState) {
        self.device().state = state;
    }

    pub fn set_battery(&self, battery: BatteryReport) {
        self.device().battery = battery;
    }

    /// While offline every exchange times out.
    pub fn set_offline(&self, offline: bool) {
        self.device().offline = offline;
    }

    pub fn action_log(&self) -> Vec<LockAction> {
        self.device().action_log.clone()
    }

    pub fn config_writes(&self) -> Vec<ConfigUpdate> {
        self.device().config_writes.clone()
    }

    pub fn pair_attempts(&self) -> u32 {
        self.device().pair_attempts
    }

    fn device(&self) -> MutexGuard<'_, SimulatedDevice> {
        // A panic while holding the guard cannot leave the device half-updated.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn online(&self) -> Result<MutexGuard<'_, SimulatedDevice>, DeviceError> {
        let device = self.device();
        if device.offline {
            return Err(DeviceError::Timeout("simulated lock is offline".to_string()));
        }
        if !device.paired {
            return Err(DeviceError::NotPaired);
        }
        Ok(device)
    }
}

impl DeviceSession for SimulatedLock {
    fn pair(&mut self) -> bool {
        let mut device = self.device();
        if device.paired {
            return true;
        }
        device.pair_attempts += 1;
        device.paired = device.pair_attempts >= device.pair_after;
        debug!(
            "Simulated pairing attempt {} -> {}",
            device.pair_attempts, device.paired
        );
        device.paired
    }

    fn read_state(&mut self) -> Result<KeyTurnerState, DeviceError> {
        Ok(self.online()?.state)
    }

    fn read_battery(&mut self) -> Result<BatteryReport, DeviceError> {
        Ok(self.online()?.battery)
    }

    fn send_action(
        &mut self,
        action: LockAction,
        _param1: u32,
        _param2: u8,
    ) -> Result<CommandResult, DeviceError> {
        let mut device = self.online()?;
        info!("Simulated lock executing {}", action);

        device.state.lock_state = match action {
            LockAction::Unlock | LockAction::FobAction1 => LockState::Unlocked,
            LockAction::Lock | LockAction::FullLock | LockAction::FobAction2 => LockState::Locked,
            LockAction::Unlatch | LockAction::LockNgoUnlatch | LockAction::FobAction3 => {
                LockState::Unlatched
            }
            LockAction::LockNgo => LockState::UnlockedLnga,
        };
        device.state.trigger = Trigger::System;
        device.state.completion_status = CompletionStatus::Success;
        device.battery.drain_mws = device.battery.drain_mws.saturating_add(1150);
        device.authorization = Some(AuthorizationInfo {
            id: BRIDGE_AUTH_ID,
            name: BRIDGE_AUTH_NAME.to_string(),
        });
        device.action_log.push(action);

        Ok(CommandResult::Success)
    }

    fn read_config(&mut self) -> Result<LockConfig, DeviceError> {
        Ok(self.online()?.config)
    }

    fn read_advanced_config(&mut self) -> Result<AdvancedConfig, DeviceError> {
        Ok(self.online()?.advanced)
    }

    fn write_config_value(&mut self, update: ConfigUpdate) -> Result<(), DeviceError> {
        let mut device = self.online()?;
        let SimulatedDevice {
            config, advanced, ..
        } = &mut *device;
        update.apply(config, advanced);
        device.config_writes.push(update);
        Ok(())
    }

    fn last_authorization(&mut self) -> Result<Option<AuthorizationInfo>, DeviceError> {
        Ok(self.online()?.authorization.clone())
    }
}
