//! Fakes shared by the unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use rumqttc::Transport;

use crate::lock::engine::{StateField, StatePublisher};
use crate::lock::state::{AdvancedConfig, AuthorizationInfo, BatteryReport, CommandResult, LockConfig};
use crate::mqtt::client::{BrokerClient, ConnectOptions};
use crate::mqtt::error::ConnectError;
use crate::mqtt::message_manager::InboundMessage;
use crate::mqtt::mqtt_handler::InboundHandler;
use crate::mqtt::topics::Topic;
use crate::network::{NetworkDevice, NetworkError};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub fields: Vec<StateField>,
    pub battery_reports: Vec<BatteryReport>,
    pub configs: Vec<LockConfig>,
    pub advanced_configs: Vec<AdvancedConfig>,
    pub authorizations: Vec<AuthorizationInfo>,
    pub command_results: Vec<CommandResult>,
}

impl RecordingPublisher {
    pub fn total(&self) -> usize {
        self.fields.len()
            + self.battery_reports.len()
            + self.configs.len()
            + self.advanced_configs.len()
            + self.authorizations.len()
            + self.command_results.len()
    }
}

impl StatePublisher for RecordingPublisher {
    fn publish_state_field(&mut self, field: StateField) -> bool {
        self.fields.push(field);
        true
    }

    fn publish_battery_report(&mut self, report: &BatteryReport) {
        self.battery_reports.push(*report);
    }

    fn publish_config(&mut self, config: &LockConfig) {
        self.configs.push(*config);
    }

    fn publish_advanced_config(&mut self, config: &AdvancedConfig) {
        self.advanced_configs.push(*config);
    }

    fn publish_authorization_info(&mut self, auth: &AuthorizationInfo) {
        self.authorizations.push(auth.clone());
    }

    fn publish_command_result(&mut self, result: CommandResult) {
        self.command_results.push(result);
    }
}

#[derive(Debug, Default)]
struct BrokerLog {
    refusal: Option<ConnectError>,
    connected: bool,
    attempts: Vec<(String, Option<String>)>,
    published: Vec<(String, Vec<u8>, bool)>,
    subscriptions: Vec<String>,
    inbox: Vec<InboundMessage>,
    drop_on_poll: bool,
}

/// In-memory broker. Clones share state so a test can keep a handle.
#[derive(Debug, Clone, Default)]
pub struct FakeBroker {
    inner: Arc<Mutex<BrokerLog>>,
}

impl FakeBroker {
    pub fn refuse_with(&self, refusal: Option<ConnectError>) {
        guard(&self.inner).refusal = refusal;
    }

    /// `(client id, user)` of every connect attempt.
    pub fn attempts(&self) -> Vec<(String, Option<String>)> {
        guard(&self.inner).attempts.clone()
    }

    pub fn published(&self) -> Vec<(String, String, bool)> {
        guard(&self.inner)
            .published
            .iter()
            .map(|(topic, payload, retain)| {
                (
                    topic.clone(),
                    String::from_utf8_lossy(payload).into_owned(),
                    *retain,
                )
            })
            .collect()
    }

    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| payload)
            .collect()
    }

    pub fn clear_published(&self) {
        guard(&self.inner).published.clear();
    }

    pub fn subscriptions(&self) -> Vec<String> {
        guard(&self.inner).subscriptions.clone()
    }

    pub fn deliver(&self, topic: &str, payload: &str) {
        guard(&self.inner)
            .inbox
            .push(InboundMessage::from_topic(topic, payload));
    }

    /// The next poll reports a lost connection.
    pub fn drop_connection(&self) {
        guard(&self.inner).drop_on_poll = true;
    }
}

impl BrokerClient for FakeBroker {
    fn connect(&mut self, options: &ConnectOptions) -> Result<(), ConnectError> {
        let mut log = guard(&self.inner);
        log.attempts.push((
            options.client_id.clone(),
            options.credentials.as_ref().map(|c| c.user.clone()),
        ));
        if let Some(refusal) = log.refusal.clone() {
            return Err(refusal);
        }
        log.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        guard(&self.inner).connected = false;
    }

    fn is_connected(&self) -> bool {
        guard(&self.inner).connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        let mut log = guard(&self.inner);
        if !log.connected {
            return false;
        }
        log.published
            .push((topic.to_string(), payload.to_vec(), retain));
        true
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        let mut log = guard(&self.inner);
        if !log.connected {
            return false;
        }
        log.subscriptions.push(topic.to_string());
        true
    }

    fn poll(&mut self) -> Result<Vec<InboundMessage>, ConnectError> {
        let mut log = guard(&self.inner);
        if log.drop_on_poll {
            log.drop_on_poll = false;
            log.connected = false;
            return Err(ConnectError::Io("connection reset".to_string()));
        }
        Ok(std::mem::take(&mut log.inbox))
    }
}

#[derive(Debug, Default)]
struct NetworkLog {
    connected: bool,
    reconnects: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeNetwork {
    inner: Arc<Mutex<NetworkLog>>,
}

impl FakeNetwork {
    pub fn connected() -> Self {
        let network = Self::default();
        network.set_connected(true);
        network
    }

    pub fn set_connected(&self, connected: bool) {
        guard(&self.inner).connected = connected;
    }

    pub fn reconnects(&self) -> usize {
        guard(&self.inner).reconnects
    }
}

impl NetworkDevice for FakeNetwork {
    fn name(&self) -> &str {
        "fake"
    }

    fn initialize(&mut self) -> Result<(), NetworkError> {
        Ok(())
    }

    fn update(&mut self) {}

    fn is_connected(&self) -> bool {
        guard(&self.inner).connected
    }

    fn reconnect(&mut self) -> bool {
        let mut log = guard(&self.inner);
        log.reconnects += 1;
        log.connected
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }
}

/// Records what the broker session routed to it.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub accept: bool,
    pub actions: Vec<String>,
    pub config_updates: Vec<(Topic, String)>,
    pub forwarded: Vec<String>,
}

impl InboundHandler for RecordingHandler {
    fn on_lock_action(&mut self, value: &str) -> bool {
        self.actions.push(value.to_string());
        self.accept
    }

    fn on_config_update(&mut self, topic: Topic, value: &str) {
        self.config_updates.push((topic, value.to_string()));
    }

    fn on_forward(&mut self, message: &InboundMessage) {
        self.forwarded.push(message.topic.clone());
    }
}
