//! The cooperative control loop that drives network, broker and lock.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lock::engine::{NukiLock, Paired, Pairing};
use crate::mqtt::discovery::DiscoveryInfo;
use crate::mqtt::error::MqttError;
use crate::mqtt::mqtt_handler::{InboundHandler, MqttHandler};
use crate::mqtt::topics::Topic;
use crate::watchdog::{ConnectivityWatchdog, WatchdogStatus};

pub const LOOP_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Terminal; the process is expected to be restarted by its supervisor
    #[error("Network unavailable for more than {timeout_secs}s")]
    NetworkTimeout { timeout_secs: u64 },
}

#[derive(Debug)]
pub enum LockSession {
    Pairing(NukiLock<Pairing>),
    Paired(NukiLock<Paired>),
}

impl LockSession {
    /// One pairing attempt if still unpaired.
    fn advance(self) -> Self {
        match self {
            LockSession::Pairing(engine) => match engine.try_pair() {
                Ok(paired) => LockSession::Paired(paired),
                Err(unpaired) => LockSession::Pairing(unpaired),
            },
            paired => paired,
        }
    }
}

pub struct Bridge {
    network: MqttHandler,
    lock: Option<LockSession>,
    watchdog: ConnectivityWatchdog,
    discovery: Option<DiscoveryInfo>,
    /// Connection count at which discovery was last published
    discovery_epoch: usize,
    loop_interval: Duration,
}

impl Bridge {
    pub fn new(
        network: MqttHandler,
        engine: NukiLock<Pairing>,
        watchdog: ConnectivityWatchdog,
        discovery: Option<DiscoveryInfo>,
    ) -> Self {
        Self {
            network,
            lock: Some(LockSession::Pairing(engine)),
            watchdog,
            discovery,
            discovery_epoch: 0,
            loop_interval: LOOP_INTERVAL,
        }
    }

    pub fn network(&self) -> &MqttHandler {
        &self.network
    }

    pub fn is_paired(&self) -> bool {
        matches!(self.lock, Some(LockSession::Paired(_)))
    }

    /// Queues a presence list for the next iteration with a broker connection.
    pub fn report_presence(&mut self, csv: String) {
        self.network.publish_presence_detection(csv);
    }

    /// One loop iteration.
    pub fn update(&mut self, now: Instant) -> Result<(), BridgeError> {
        let network_up = self.network.update_network();
        if self.watchdog.check(network_up, now) == WatchdogStatus::Expired {
            return Err(BridgeError::NetworkTimeout {
                timeout_secs: self.watchdog.timeout().map_or(0, |t| t.as_secs()),
            });
        }

        let connected = self.network.ensure_connected(now);
        if connected {
            self.network.flush_presence();
        }

        self.lock = self.lock.take().map(LockSession::advance);
        if !connected {
            return Ok(());
        }

        if self.is_paired() {
            self.publish_discovery_once();
        }

        match self.lock.as_mut() {
            Some(LockSession::Paired(engine)) => {
                self.network.dispatch_pending(&mut *engine);
                engine.tick(now, &mut self.network);
            }
            // The session is pumped while pairing too, commands are refused
            _ => self.network.dispatch_pending(&mut DetachedHandler),
        }
        Ok(())
    }

    fn publish_discovery_once(&mut self) {
        let epoch = self.network.status().connections;
        if epoch == self.discovery_epoch {
            return;
        }
        if let Some(info) = &self.discovery {
            if let Err(e) = self.network.publish_discovery(info) {
                warn!("Discovery not published: {}", e);
                return;
            }
        }
        self.discovery_epoch = epoch;
    }

    /// Runs until cancelled or the network watchdog gives up.
    pub fn run(&mut self, cancel: CancellationToken) -> Result<(), BridgeError> {
        info!("Bridge loop started");
        while !cancel.is_cancelled() {
            if let Err(e) = self.update(Instant::now()) {
                self.network.disconnect();
                return Err(e);
            }
            std::thread::sleep(self.loop_interval);
        }
        self.network.disconnect();
        info!("Bridge loop stopped");
        Ok(())
    }

    /// Connects once and clears the retained discovery documents.
    pub fn remove_discovery(&mut self, timeout: Duration) -> Result<(), MqttError> {
        let Some(uid) = self.discovery.as_ref().map(|info| info.uid.clone()) else {
            info!("Discovery not configured, nothing to remove");
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        loop {
            self.network.update_network();
            let now = Instant::now();
            if self.network.ensure_connected(now) {
                break;
            }
            if now >= deadline {
                return Err(MqttError::NotConnected);
            }
            std::thread::sleep(self.loop_interval);
        }

        let result = self.network.remove_discovery(&uid);
        // One pump so the client flushes the queued publishes
        self.network.dispatch_pending(&mut DetachedHandler);
        self.network.disconnect();
        result
    }
}

/// Inbound side without a paired lock: commands are refused, configuration is dropped.
struct DetachedHandler;

impl InboundHandler for DetachedHandler {
    fn on_lock_action(&mut self, _value: &str) -> bool {
        false
    }

    fn on_config_update(&mut self, _topic: Topic, _value: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::simulated::SimulatedLock;
    use crate::lock::state::{ConfigUpdate, LockAction};
    use crate::mqtt::config::MqttConfig;
    use crate::mqtt::error::ConnectError;
    use crate::testing::{FakeBroker, FakeNetwork};
    use pretty_assertions::assert_eq;

    struct Rig {
        broker: FakeBroker,
        network: FakeNetwork,
        lock: SimulatedLock,
        bridge: Bridge,
    }

    fn rig(lock: SimulatedLock, timeout_secs: i64, discovery_topic: &str, t0: Instant) -> Rig {
        let broker = FakeBroker::default();
        let network = FakeNetwork::connected();
        let mut handler =
            MqttHandler::new(Box::new(broker.clone()), Box::new(network.clone()), "nukihub");
        handler
            .configure(MqttConfig {
                broker: "broker.local".to_string(),
                discovery_topic: discovery_topic.to_string(),
                ..Default::default()
            })
            .unwrap();
        let discovery = Some(DiscoveryInfo::smart_lock(
            handler.namespace(),
            "Front door",
            "2a3b4c",
        ));
        let engine = NukiLock::create(Box::new(lock.clone()), None);
        let bridge = Bridge::new(
            handler,
            engine,
            ConnectivityWatchdog::new(timeout_secs, t0),
            discovery,
        );
        Rig {
            broker,
            network,
            lock,
            bridge,
        }
    }

    #[test]
    fn first_iteration_connects_pairs_and_publishes() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.bridge.update(t0).unwrap();

        assert!(rig.bridge.is_paired());
        assert!(rig.bridge.network().is_mqtt_connected());
        assert_eq!(rig.broker.published_to("nuki/lock/state"), vec!["locked"]);
        assert_eq!(rig.broker.published_to("nuki/battery/level"), vec!["100"]);
        assert_eq!(rig.broker.published_to("nuki/battery/voltage"), vec!["6.12"]);
        assert_eq!(
            rig.broker.published_to("nuki/configuration/ledBrightness"),
            vec!["3"]
        );
    }

    #[test]
    fn command_round_trip() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.bridge.update(t0).unwrap();

        rig.broker.deliver("nuki/lock/action", "unlock");
        rig.bridge.update(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(rig.lock.action_log(), vec![LockAction::Unlock]);
        assert_eq!(rig.broker.published_to("nuki/lock/action"), vec!["ack"]);
        assert_eq!(
            rig.broker.published_to("nuki/lock/commandResult"),
            vec!["success"]
        );

        // Refresh is due 11s after the command, not at the regular 60s
        rig.bridge.update(t0 + Duration::from_secs(11)).unwrap();
        assert_eq!(rig.broker.published_to("nuki/lock/state"), vec!["locked"]);
        rig.bridge.update(t0 + Duration::from_secs(12)).unwrap();
        assert_eq!(
            rig.broker.published_to("nuki/lock/state"),
            vec!["locked", "unlocked"]
        );
        assert_eq!(
            rig.broker.published_to("nuki/lock/authorizationName"),
            vec!["nukihub"]
        );
    }

    #[test]
    fn unknown_command_is_rejected_without_device_call() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.bridge.update(t0).unwrap();

        rig.broker.deliver("nuki/lock/action", "dance");
        rig.bridge.update(t0 + Duration::from_secs(1)).unwrap();
        assert!(rig.lock.action_log().is_empty());
        assert_eq!(
            rig.broker.published_to("nuki/lock/action"),
            vec!["unknown_action"]
        );
        assert!(rig.broker.published_to("nuki/lock/commandResult").is_empty());
    }

    #[test]
    fn retained_config_echo_does_not_write_device() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.bridge.update(t0).unwrap();

        rig.broker.deliver("nuki/configuration/ledBrightness", "3");
        rig.broker.deliver("nuki/configuration/buttonEnabled", "1");
        rig.bridge.update(t0 + Duration::from_secs(1)).unwrap();
        assert!(rig.lock.config_writes().is_empty());

        rig.broker.deliver("nuki/configuration/ledBrightness", "1");
        rig.bridge.update(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(rig.lock.config_writes().len(), 1);
    }

    #[test]
    fn lock_side_waits_for_pairing() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new().with_pairing_after(3), -1, "", t0);

        rig.bridge.update(t0).unwrap();
        rig.bridge.update(t0 + LOOP_INTERVAL).unwrap();
        assert!(!rig.bridge.is_paired());
        assert!(rig.bridge.network().is_mqtt_connected());
        assert!(rig.broker.published_to("nuki/lock/state").is_empty());

        rig.bridge.update(t0 + LOOP_INTERVAL * 2).unwrap();
        assert!(rig.bridge.is_paired());
        assert_eq!(rig.lock.pair_attempts(), 3);
        assert_eq!(rig.broker.published_to("nuki/lock/state"), vec!["locked"]);
    }

    #[test]
    fn session_is_serviced_while_pairing() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new().with_pairing_after(50), -1, "", t0);
        rig.bridge.report_presence("aa:bb:cc;-70".to_string());

        rig.broker.deliver("nuki/configuration/ledBrightness", "5");
        rig.broker.deliver("nuki/lock/action", "unlock");
        for i in 0..5 {
            rig.bridge.update(t0 + LOOP_INTERVAL * i).unwrap();
        }

        assert!(!rig.bridge.is_paired());
        assert_eq!(rig.bridge.network().status().messages_received, 2);
        assert_eq!(
            rig.broker.published_to("nuki/presence/devices"),
            vec!["aa:bb:cc;-70"]
        );
        assert_eq!(
            rig.broker.published_to("nuki/lock/action"),
            vec!["unknown_action"]
        );
        assert!(rig.lock.action_log().is_empty());
        assert!(rig.lock.config_writes().is_empty());
    }

    #[test]
    fn lost_session_is_noticed_while_pairing() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new().with_pairing_after(50), -1, "", t0);
        rig.bridge.update(t0).unwrap();
        assert!(rig.bridge.network().is_mqtt_connected());

        rig.broker.drop_connection();
        rig.bridge.update(t0 + LOOP_INTERVAL).unwrap();
        assert!(!rig.bridge.network().is_mqtt_connected());
    }

    #[test]
    fn config_and_command_in_one_pump_are_both_applied() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.bridge.update(t0).unwrap();

        rig.broker.deliver("nuki/configuration/ledBrightness", "5");
        rig.broker.deliver("nuki/lock/action", "lock");
        rig.bridge.update(t0 + Duration::from_secs(1)).unwrap();

        assert_eq!(rig.lock.config_writes(), vec![ConfigUpdate::LedBrightness(5)]);
        assert_eq!(rig.lock.action_log(), vec![LockAction::Lock]);
        assert_eq!(rig.broker.published_to("nuki/lock/action"), vec!["ack"]);
        assert_eq!(
            rig.broker.published_to("nuki/configuration/ledBrightness"),
            vec!["3", "5"]
        );
    }

    #[test]
    fn nothing_is_synchronized_without_broker() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.broker
            .refuse_with(Some(ConnectError::Timeout(Duration::from_secs(3))));
        rig.bridge.update(t0).unwrap();

        assert!(rig.bridge.is_paired());
        assert!(rig.broker.published().is_empty());

        // Backoff holds the next attempt, the lock keeps waiting
        rig.broker.refuse_with(None);
        rig.bridge.update(t0 + Duration::from_secs(1)).unwrap();
        assert!(rig.broker.published().is_empty());
        rig.bridge.update(t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(rig.broker.published_to("nuki/lock/state"), vec!["locked"]);
    }

    #[test]
    fn watchdog_ends_the_loop() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), 30, "", t0);
        rig.bridge.update(t0).unwrap();

        rig.network.set_connected(false);
        rig.bridge.update(t0 + Duration::from_secs(10)).unwrap();
        assert!(!rig.bridge.network().is_mqtt_connected());
        rig.bridge.update(t0 + Duration::from_secs(30)).unwrap();
        assert!(matches!(
            rig.bridge.update(t0 + Duration::from_secs(31)),
            Err(BridgeError::NetworkTimeout { timeout_secs: 30 })
        ));
    }

    #[test]
    fn discovery_is_published_once_per_connection() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "homeassistant", t0);
        let path = "homeassistant/lock/2a3b4c/smartlock/config";

        rig.bridge.update(t0).unwrap();
        rig.bridge.update(t0 + LOOP_INTERVAL).unwrap();
        assert_eq!(rig.broker.published_to(path).len(), 1);

        rig.broker.drop_connection();
        rig.bridge.update(t0 + LOOP_INTERVAL * 2).unwrap();
        rig.bridge.update(t0 + LOOP_INTERVAL * 3).unwrap();
        assert_eq!(rig.broker.published_to(path).len(), 2);
    }

    #[test]
    fn presence_is_flushed_when_connected() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "", t0);
        rig.bridge.report_presence("aa:bb:cc;-70".to_string());
        rig.bridge.update(t0).unwrap();
        assert_eq!(
            rig.broker.published_to("nuki/presence/devices"),
            vec!["aa:bb:cc;-70"]
        );
    }

    #[test]
    fn remove_discovery_clears_documents() {
        let t0 = Instant::now();
        let mut rig = rig(SimulatedLock::new(), -1, "homeassistant", t0);
        rig.bridge.remove_discovery(Duration::from_secs(1)).unwrap();
        assert_eq!(
            rig.broker
                .published_to("homeassistant/binary_sensor/2a3b4c/battery_low/config"),
            vec![""]
        );
        assert!(!rig.bridge.network().is_mqtt_connected());
    }
}
