//! Synchronization engine between the lock and the broker.
//!
//! The engine keeps two snapshots of the lock (last published and freshly read),
//! publishes only what changed, and owns the single pending command slot. Its
//! pairing lifecycle is a statum machine: a `NukiLock<Pairing>` has to become a
//! `NukiLock<Paired>` before anything else happens.

use std::time::{Duration, Instant};

use statum::{machine, state};
use tracing::{debug, error, info, warn};

use super::device::DeviceSession;
use super::error::LockError;
use super::state::{
    parse_bool, AdvancedConfig, AuthorizationInfo, BatteryReport, CommandResult,
    CompletionStatus, ConfigUpdate, DoorSensorState, KeyTurnerState, LockAction, LockConfig,
    LockState, Trigger, MAX_LED_BRIGHTNESS,
};
use crate::mqtt::message_manager::InboundMessage;
use crate::mqtt::mqtt_handler::InboundHandler;
use crate::mqtt::topics::Topic;

/// One field of [`KeyTurnerState`] that needs publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    LockState(LockState),
    Trigger(Trigger),
    CompletionStatus(CompletionStatus),
    DoorSensorState(DoorSensorState),
    BatteryCritical(bool),
    BatteryCharging(bool),
    BatteryLevel(u8),
}

/// Sink for everything the engine publishes.
pub trait StatePublisher {
    fn publish_state_field(&mut self, field: StateField) -> bool;

    /// Publishes the fields of `current` that differ from `last`. Returns how many went out.
    fn publish_key_turner_state(
        &mut self,
        current: &KeyTurnerState,
        last: &KeyTurnerState,
        force: bool,
    ) -> usize {
        changed_fields(current, last, force)
            .into_iter()
            .filter(|field| self.publish_state_field(*field))
            .count()
    }

    fn publish_battery_report(&mut self, report: &BatteryReport);
    fn publish_config(&mut self, config: &LockConfig);
    fn publish_advanced_config(&mut self, config: &AdvancedConfig);
    fn publish_authorization_info(&mut self, auth: &AuthorizationInfo);
    fn publish_command_result(&mut self, result: CommandResult);
}

/// Fields of `current` that differ from `last`, or all of them when `force` is set.
/// An undefined lock state is never reported.
pub fn changed_fields(
    current: &KeyTurnerState,
    last: &KeyTurnerState,
    force: bool,
) -> Vec<StateField> {
    let mut fields = Vec::new();

    if (force || current.lock_state != last.lock_state)
        && current.lock_state != LockState::Undefined
    {
        fields.push(StateField::LockState(current.lock_state));
    }
    if force || current.trigger != last.trigger {
        fields.push(StateField::Trigger(current.trigger));
    }
    if force || current.completion_status != last.completion_status {
        fields.push(StateField::CompletionStatus(current.completion_status));
    }
    if force || current.door_sensor_state != last.door_sensor_state {
        fields.push(StateField::DoorSensorState(current.door_sensor_state));
    }
    if force || current.battery_critical != last.battery_critical {
        fields.push(StateField::BatteryCritical(current.battery_critical));
    }
    if force || current.battery_charging != last.battery_charging {
        fields.push(StateField::BatteryCharging(current.battery_charging));
    }
    if force || current.battery_level != last.battery_level {
        fields.push(StateField::BatteryLevel(current.battery_level));
    }

    fields
}

pub const LOCK_STATE_INTERVAL_SECS: u64 = 60;
pub const CONFIG_INTERVAL_SECS: u64 = 3600;
pub const COMMAND_SETTLE_MS: u64 = 11_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockSettings {
    pub lock_state_interval: Duration,
    pub battery_interval: Duration,
    pub config_interval: Duration,
    /// Delay before re-reading the state after a command was sent.
    pub command_settle_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        let lock_state_interval = Duration::from_secs(LOCK_STATE_INTERVAL_SECS);
        Self {
            lock_state_interval,
            battery_interval: lock_state_interval * 30,
            config_interval: Duration::from_secs(CONFIG_INTERVAL_SECS),
            command_settle_delay: Duration::from_millis(COMMAND_SETTLE_MS),
        }
    }
}

/// Everything the synchronization tick mutates.
#[derive(Debug)]
pub struct SyncState {
    last_published: KeyTurnerState,
    current: KeyTurnerState,
    first_publish: bool,
    pending_action: Option<LockAction>,
    next_lock_state_update: Option<Instant>,
    next_battery_report: Option<Instant>,
    next_config_update: Option<Instant>,
    config: Option<LockConfig>,
    advanced_config: Option<AdvancedConfig>,
    last_authorization: Option<AuthorizationInfo>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_published: KeyTurnerState::default(),
            current: KeyTurnerState::default(),
            first_publish: true,
            pending_action: None,
            next_lock_state_update: None,
            next_battery_report: None,
            next_config_update: None,
            config: None,
            advanced_config: None,
            last_authorization: None,
        }
    }
}

fn is_due(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.map_or(true, |deadline| now >= deadline)
}

#[state]
#[derive(Debug, Clone)]
pub enum PairingState {
    Pairing,
    Paired,
}

#[machine]
#[derive(Debug)]
pub struct NukiLock<S: PairingState> {
    device: Box<dyn DeviceSession>,
    settings: LockSettings,
    sync: SyncState,
}

impl<S: PairingState> NukiLock<S> {
    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }
}

impl NukiLock<Pairing> {
    pub fn create(device: Box<dyn DeviceSession>, settings: Option<LockSettings>) -> Self {
        let settings = settings.unwrap_or_default();
        info!("Creating lock engine with settings: {:?}", settings);
        Self::new(device, settings, SyncState::default())
    }

    /// One pairing attempt; hands the unpaired machine back on failure.
    pub fn try_pair(mut self) -> Result<NukiLock<Paired>, Self> {
        debug!("Nuki start pairing");
        if self.device.pair() {
            info!("Nuki paired");
            Ok(self.transition())
        } else {
            debug!("Pairing attempt failed");
            Err(self)
        }
    }
}

impl NukiLock<Paired> {
    /// Runs whatever refreshes are due at `now` and issues the pending command.
    pub fn tick(&mut self, now: Instant, publisher: &mut dyn StatePublisher) {
        if is_due(self.sync.next_lock_state_update, now) {
            self.sync.next_lock_state_update = Some(now + self.settings.lock_state_interval);
            self.update_key_turner_state(publisher);
        }
        if is_due(self.sync.next_battery_report, now) {
            self.sync.next_battery_report = Some(now + self.settings.battery_interval);
            self.update_battery_state(publisher);
        }
        if is_due(self.sync.next_config_update, now) {
            self.sync.next_config_update = Some(now + self.settings.config_interval);
            self.update_config(publisher);
        }
        if let Some(action) = self.sync.pending_action.take() {
            self.issue_action(action, publisher);
            self.sync.next_lock_state_update = Some(now + self.settings.command_settle_delay);
        }
    }

    /// Translates a command string and fills the slot. Unknown strings leave it untouched.
    pub fn queue_action(&mut self, value: &str) -> Result<LockAction, LockError> {
        let action: LockAction = value.parse()?;
        if let Some(previous) = self.sync.pending_action.replace(action) {
            debug!("Replacing pending action {} with {}", previous, action);
        }
        info!("Lock action queued: {}", action);
        Ok(action)
    }

    pub fn pending_action(&self) -> Option<LockAction> {
        self.sync.pending_action
    }

    pub fn next_lock_state_update(&self) -> Option<Instant> {
        self.sync.next_lock_state_update
    }

    pub fn last_published(&self) -> &KeyTurnerState {
        &self.sync.last_published
    }

    /// Parses a configuration payload and writes it to the device when it changes anything.
    pub fn apply_config_update(&mut self, topic: Topic, value: &str) -> Result<(), LockError> {
        let update = parse_config_update(topic, value)?;

        let (Some(config), Some(advanced)) = (
            self.sync.config.as_mut(),
            self.sync.advanced_config.as_mut(),
        ) else {
            return Err(LockError::ConfigNotLoaded);
        };
        if update.is_noop(config, advanced) {
            debug!("Ignoring unchanged configuration value {:?}", update);
            return Ok(());
        }

        info!("Writing configuration value {:?}", update);
        self.device.write_config_value(update)?;
        update.apply(config, advanced);
        // Read back on the next tick
        self.sync.next_config_update = None;
        Ok(())
    }

    fn update_key_turner_state(&mut self, publisher: &mut dyn StatePublisher) {
        let state = match self.device.read_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to read lock state: {}", e);
                return;
            }
        };
        self.sync.current = state;
        info!("Nuki lock state: {}", state.lock_state.as_str());

        let published = publisher.publish_key_turner_state(
            &self.sync.current,
            &self.sync.last_published,
            self.sync.first_publish,
        );
        debug!("Published {} changed state fields", published);

        if self.sync.first_publish || self.sync.current != self.sync.last_published {
            self.update_authorization(publisher);
        }

        self.sync.last_published = self.sync.current;
        self.sync.first_publish = false;
    }

    fn update_authorization(&mut self, publisher: &mut dyn StatePublisher) {
        match self.device.last_authorization() {
            Ok(Some(auth)) if self.sync.last_authorization.as_ref() != Some(&auth) => {
                publisher.publish_authorization_info(&auth);
                self.sync.last_authorization = Some(auth);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read authorization log: {}", e),
        }
    }

    fn update_battery_state(&mut self, publisher: &mut dyn StatePublisher) {
        match self.device.read_battery() {
            Ok(report) => {
                debug!(
                    "Voltage: {} Drain: {} Max Current: {} Lock Dist: {}",
                    report.voltage_mv,
                    report.drain_mws,
                    report.max_turn_current_ma,
                    report.lock_distance
                );
                publisher.publish_battery_report(&report);
            }
            Err(e) => warn!("Failed to read battery report: {}", e),
        }
    }

    fn update_config(&mut self, publisher: &mut dyn StatePublisher) {
        match self.device.read_config() {
            Ok(config) => {
                publisher.publish_config(&config);
                self.sync.config = Some(config);
            }
            Err(e) => warn!("Failed to read lock configuration: {}", e),
        }
        match self.device.read_advanced_config() {
            Ok(config) => {
                publisher.publish_advanced_config(&config);
                self.sync.advanced_config = Some(config);
            }
            Err(e) => warn!("Failed to read advanced configuration: {}", e),
        }
    }

    fn issue_action(&mut self, action: LockAction, publisher: &mut dyn StatePublisher) {
        info!("Sending lock action {}", action);
        let result = match self.device.send_action(action, 0, 0) {
            Ok(result) => result,
            Err(e) => {
                error!("Lock action {} failed: {}", action, e);
                CommandResult::Failed
            }
        };
        info!("Lock action result: {}", result.as_str());
        publisher.publish_command_result(result);
    }
}

impl InboundHandler for NukiLock<Paired> {
    fn on_lock_action(&mut self, value: &str) -> bool {
        match self.queue_action(value) {
            Ok(_) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn on_config_update(&mut self, topic: Topic, value: &str) {
        if let Err(e) = self.apply_config_update(topic, value) {
            warn!("Configuration update on {} rejected: {}", topic.as_str(), e);
        }
    }

    fn on_forward(&mut self, message: &InboundMessage) {
        debug!("Forwarded message: {}", message);
    }
}

fn parse_config_update(topic: Topic, value: &str) -> Result<ConfigUpdate, LockError> {
    let invalid = |setting: &'static str| LockError::InvalidConfigValue {
        setting,
        value: value.to_string(),
    };
    let flag = |setting: &'static str| parse_bool(value).ok_or_else(|| invalid(setting));

    match topic {
        Topic::ConfigButtonEnabled => Ok(ConfigUpdate::ButtonEnabled(flag("buttonEnabled")?)),
        Topic::ConfigLedEnabled => Ok(ConfigUpdate::LedEnabled(flag("ledEnabled")?)),
        Topic::ConfigLedBrightness => value
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|b| *b <= MAX_LED_BRIGHTNESS)
            .map(ConfigUpdate::LedBrightness)
            .ok_or_else(|| invalid("ledBrightness")),
        Topic::ConfigAutoUnlock => Ok(ConfigUpdate::AutoUnlock(flag("autoUnlock")?)),
        Topic::ConfigAutoLock => Ok(ConfigUpdate::AutoLock(flag("autoLock")?)),
        _ => Err(invalid("configuration")),
    }
}
