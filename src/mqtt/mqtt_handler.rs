use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::client::{BrokerClient, ConnectOptions, Credentials};
use super::config::MqttConfig;
use super::discovery::{self, DiscoveryInfo};
use super::error::MqttError;
use super::message_manager::InboundMessage;
use super::topics::{Topic, TopicNamespace};
use crate::lock::engine::{StateField, StatePublisher};
use crate::lock::state::{
    AdvancedConfig, AuthorizationInfo, BatteryReport, CommandResult, LockConfig,
};
use crate::network::NetworkDevice;

/// Reply on the command topic for an accepted action.
pub const ACK: &str = "ack";
/// Reply on the command topic for a command string that maps to no action.
pub const UNKNOWN_ACTION: &str = "unknown_action";

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const MAX_ERROR_MESSAGES: usize = 16;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    /// Most recent failures, oldest first
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    /// Successful connects since startup
    pub connections: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

impl MqttStatus {
    fn record_error(&mut self, message: String) {
        if self.error_messages.len() >= MAX_ERROR_MESSAGES {
            self.error_messages.remove(0);
        }
        self.error_messages.push(message);
    }

    fn touch(&mut self) {
        self.last_activity = Some(chrono::Local::now());
    }
}

/// Receiver of routed inbound messages.
pub trait InboundHandler {
    /// A command arrived on the command topic. Returns whether it was accepted.
    fn on_lock_action(&mut self, value: &str) -> bool;

    fn on_config_update(&mut self, topic: Topic, value: &str);

    /// Anything that matched none of the subscribed topics.
    fn on_forward(&mut self, _message: &InboundMessage) {}
}

/// Broker session: network adapter, connection with backoff, namespaced
/// publishing and inbound routing.
pub struct MqttHandler {
    status: MqttStatus,
    client: Box<dyn BrokerClient>,
    device: Box<dyn NetworkDevice>,
    config: MqttConfig,
    namespace: TopicNamespace,
    hostname: String,
    next_reconnect: Option<Instant>,
    reconnect_delay: Duration,
    presence_csv: Option<String>,
    network_connected: bool,
}

impl MqttHandler {
    pub fn new(
        client: Box<dyn BrokerClient>,
        device: Box<dyn NetworkDevice>,
        hostname: impl Into<String>,
    ) -> Self {
        MqttHandler {
            status: MqttStatus::default(),
            client,
            device,
            config: MqttConfig::default(),
            namespace: TopicNamespace::default(),
            hostname: hostname.into(),
            next_reconnect: None,
            reconnect_delay: RECONNECT_DELAY,
            presence_csv: None,
            network_connected: false,
        }
    }

    /// Validates and takes over broker settings. Takes effect on the next connect.
    pub fn configure(&mut self, mut config: MqttConfig) -> Result<(), MqttError> {
        config.apply_defaults();
        if config.broker.is_empty() {
            return Err(MqttError::MissingBroker);
        }
        self.namespace = TopicNamespace::new(&config.lock_path)?;
        info!(
            "MQTT broker {}:{}, topic prefix '{}'",
            config.broker,
            config.port,
            self.namespace.prefix()
        );
        self.config = config;
        Ok(())
    }

    /// Refreshes the network adapter. Returns whether the transport is up.
    pub fn update_network(&mut self) -> bool {
        self.device.update();
        let mut connected = self.device.is_connected();

        if !connected {
            if self.network_connected {
                warn!("Network {} lost", self.device.name());
                self.disconnect();
            }
            connected = self.device.reconnect();
        }
        if connected && !self.network_connected {
            info!("Network {} connected", self.device.name());
        }

        self.network_connected = connected;
        connected
    }

    pub fn is_network_connected(&self) -> bool {
        self.network_connected
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.status.connection_state == ConnectionState::Connected && self.client.is_connected()
    }

    /// Makes at most one connection attempt, honoring the backoff deadline.
    /// Never blocks past the client's connect timeout.
    pub fn ensure_connected(&mut self, now: Instant) -> bool {
        if self.client.is_connected() {
            if self.status.connection_state == ConnectionState::Connected {
                return true;
            }
        } else if self.status.connection_state == ConnectionState::Connected {
            self.status.connection_state = ConnectionState::Disconnected;
        }

        if !self.device.is_connected() {
            return false;
        }
        if let Some(next) = self.next_reconnect {
            if now < next {
                return false;
            }
        }

        let options = self.connect_options();
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            options.host, options.port, options.client_id
        );
        self.status.connection_state = ConnectionState::Connecting;

        match self.client.connect(&options) {
            Ok(()) => {
                info!("MQTT connected");
                self.status.connection_state = ConnectionState::Connected;
                self.status.connections += 1;
                self.status.touch();
                self.next_reconnect = None;
                self.subscribe_all();
                true
            }
            Err(e) => {
                error!("MQTT connect failed, rc={}: {}", e.reason_code(), e);
                self.status.record_error(e.to_string());
                self.client.disconnect();
                self.status.connection_state = ConnectionState::Failed;
                self.next_reconnect = Some(now + self.reconnect_delay);
                false
            }
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            client_id: self.hostname.clone(),
            host: self.config.broker.clone(),
            port: self.config.port,
            credentials: self
                .config
                .credentials()
                .map(|(user, password)| Credentials { user, password }),
            keep_alive: Duration::from_secs(self.config.keep_alive_secs),
            transport: self.device.transport(),
        }
    }

    fn subscribe_all(&mut self) {
        self.subscribe(Topic::LockAction);
        for topic in Topic::CONFIG {
            self.subscribe(topic);
        }
    }

    pub fn subscribe(&mut self, topic: Topic) -> bool {
        match self.namespace.build_path(topic) {
            Ok(path) => {
                debug!("Subscribing to {}", path);
                self.client.subscribe(&path)
            }
            Err(e) => {
                error!("{}", e);
                self.status.record_error(e.to_string());
                false
            }
        }
    }

    /// Publishes under the namespace. Returns whether the client accepted it.
    pub fn publish(&mut self, topic: Topic, payload: &[u8], retain: bool) -> bool {
        match self.namespace.build_path(topic) {
            Ok(path) => self.publish_path(&path, payload, retain),
            Err(e) => {
                error!("{}", e);
                self.status.record_error(e.to_string());
                false
            }
        }
    }

    fn publish_path(&mut self, path: &str, payload: &[u8], retain: bool) -> bool {
        if !self.client.is_connected() {
            debug!("Not connected, dropping publish to {}", path);
            return false;
        }
        if self.client.publish(path, payload, retain) {
            self.status.messages_sent += 1;
            self.status.touch();
            true
        } else {
            self.status
                .record_error(format!("Publish to {} not accepted", path));
            false
        }
    }

    pub fn publish_string(&mut self, topic: Topic, value: &str) -> bool {
        self.publish(topic, value.as_bytes(), true)
    }

    pub fn publish_bool(&mut self, topic: Topic, value: bool) -> bool {
        self.publish_string(topic, if value { "1" } else { "0" })
    }

    pub fn publish_int(&mut self, topic: Topic, value: i64) -> bool {
        self.publish_string(topic, &value.to_string())
    }

    pub fn publish_uint(&mut self, topic: Topic, value: u64) -> bool {
        self.publish_string(topic, &value.to_string())
    }

    pub fn publish_float(&mut self, topic: Topic, value: f64, precision: usize) -> bool {
        self.publish_string(topic, &format!("{:.*}", precision, value))
    }

    /// Stores the list for the next [`MqttHandler::flush_presence`].
    pub fn publish_presence_detection(&mut self, csv: String) {
        self.presence_csv = Some(csv);
    }

    pub fn flush_presence(&mut self) {
        if !self.is_mqtt_connected() {
            return;
        }
        if let Some(csv) = self.presence_csv.take() {
            self.publish_string(Topic::Presence, &csv);
        }
    }

    /// Pumps the client once and routes every message that arrived.
    pub fn dispatch_pending(&mut self, handler: &mut dyn InboundHandler) {
        if !self.client.is_connected() {
            if self.status.connection_state == ConnectionState::Connected {
                self.status.connection_state = ConnectionState::Disconnected;
            }
            return;
        }

        match self.client.poll() {
            Ok(messages) => {
                for message in messages {
                    self.route(message, handler);
                }
            }
            Err(e) => {
                warn!("MQTT connection lost: {}", e);
                self.status.record_error(e.to_string());
                self.disconnect();
            }
        }
    }

    fn route(&mut self, message: InboundMessage, handler: &mut dyn InboundHandler) {
        self.status.messages_received += 1;
        self.status.touch();
        debug!("{}", message);

        match self.namespace.resolve(&message.topic) {
            Some(Topic::LockAction) => {
                let value = message.value();
                if value.is_empty() || value == ACK || value == UNKNOWN_ACTION {
                    return;
                }
                info!("Lock action received: {}", value);
                let reply = if handler.on_lock_action(&value) {
                    ACK
                } else {
                    UNKNOWN_ACTION
                };
                self.publish_string(Topic::LockAction, reply);
            }
            Some(topic) if topic.is_config() => {
                handler.on_config_update(topic, &message.value());
            }
            _ => handler.on_forward(&message),
        }
    }

    /// Publishes both discovery documents when a discovery root is configured.
    pub fn publish_discovery(&mut self, info: &DiscoveryInfo) -> Result<(), MqttError> {
        let root = self.config.discovery_topic.clone();
        if root.is_empty() {
            return Ok(());
        }
        if !self.is_mqtt_connected() {
            return Err(MqttError::NotConnected);
        }
        for (path, document) in discovery::documents(&root, info)? {
            info!("Publishing discovery config to {}", path);
            self.publish_path(&path, document.to_string().as_bytes(), true);
        }
        Ok(())
    }

    /// Clears both discovery documents with empty retained payloads.
    pub fn remove_discovery(&mut self, uid: &str) -> Result<(), MqttError> {
        let root = self.config.discovery_topic.clone();
        if root.is_empty() {
            return Ok(());
        }
        if !self.is_mqtt_connected() {
            return Err(MqttError::NotConnected);
        }
        for path in discovery::removal_paths(&root, uid)? {
            info!("Removing discovery config at {}", path);
            self.publish_path(&path, &[], true);
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
        self.status.connection_state = ConnectionState::Disconnected;
    }

    pub fn status(&self) -> &MqttStatus {
        &self.status
    }

    pub fn namespace(&self) -> &TopicNamespace {
        &self.namespace
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    pub fn initialize_network(&mut self) -> Result<(), crate::network::NetworkError> {
        info!("Initializing network device {}", self.device.name());
        self.device.initialize()
    }
}

impl StatePublisher for MqttHandler {
    fn publish_state_field(&mut self, field: StateField) -> bool {
        match field {
            StateField::LockState(state) => self.publish_string(Topic::LockState, state.as_str()),
            StateField::Trigger(trigger) => {
                self.publish_string(Topic::LockTrigger, trigger.as_str())
            }
            StateField::CompletionStatus(status) => {
                self.publish_string(Topic::LockCompletionStatus, status.as_str())
            }
            StateField::DoorSensorState(door) => {
                self.publish_string(Topic::DoorSensorState, door.as_str())
            }
            StateField::BatteryCritical(critical) => {
                self.publish_bool(Topic::BatteryCritical, critical)
            }
            StateField::BatteryCharging(charging) => {
                self.publish_bool(Topic::BatteryCharging, charging)
            }
            StateField::BatteryLevel(level) => {
                self.publish_uint(Topic::BatteryLevel, u64::from(level))
            }
        }
    }

    fn publish_battery_report(&mut self, report: &BatteryReport) {
        self.publish_float(
            Topic::BatteryVoltage,
            f64::from(report.voltage_mv) / 1000.0,
            2,
        );
        self.publish_uint(Topic::BatteryDrain, u64::from(report.drain_mws));
        self.publish_float(
            Topic::BatteryMaxTurnCurrent,
            f64::from(report.max_turn_current_ma) / 1000.0,
            2,
        );
        self.publish_uint(Topic::BatteryLockDistance, u64::from(report.lock_distance));
    }

    fn publish_config(&mut self, config: &LockConfig) {
        self.publish_bool(Topic::ConfigButtonEnabled, config.button_enabled);
        self.publish_bool(Topic::ConfigLedEnabled, config.led_enabled);
        self.publish_uint(Topic::ConfigLedBrightness, u64::from(config.led_brightness));
    }

    fn publish_advanced_config(&mut self, config: &AdvancedConfig) {
        self.publish_bool(Topic::ConfigAutoUnlock, config.auto_unlock_enabled);
        self.publish_bool(Topic::ConfigAutoLock, config.auto_lock_enabled);
    }

    fn publish_authorization_info(&mut self, auth: &AuthorizationInfo) {
        self.publish_uint(Topic::AuthId, u64::from(auth.id));
        self.publish_string(Topic::AuthName, &auth.name);
    }

    fn publish_command_result(&mut self, result: CommandResult) {
        self.publish_string(Topic::CommandResult, result.as_str());
    }
}
