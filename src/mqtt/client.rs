//! Broker client boundary and its rumqttc implementation.

use std::fmt;
use std::time::{Duration, Instant};

use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet,
    QoS, RecvTimeoutError, Transport,
};
use tracing::{debug, warn};

use super::error::ConnectError;
use super::message_manager::InboundMessage;

const REQUEST_CHANNEL_CAPACITY: usize = 100;
const MAX_EVENTS_PER_POLL: usize = 64;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
/// Upper bound for flushing the DISCONNECT packet before the socket is dropped.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Everything needed for one CONNECT.
#[derive(Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub keep_alive: Duration,
    pub transport: Transport,
}

// Keeps the password out of the logs.
impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("client_id", &self.client_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.credentials.as_ref().map(|c| c.user.as_str()))
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Connect, publish, subscribe and pump primitives of an MQTT client.
pub trait BrokerClient: Send {
    fn connect(&mut self, options: &ConnectOptions) -> Result<(), ConnectError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Queues a publish. `true` means the client accepted it, not that the broker acknowledged it.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool;

    fn subscribe(&mut self, topic: &str) -> bool;

    /// One round of network processing. Returns the messages that arrived, or an
    /// error if the session dropped, after which the client counts as disconnected.
    fn poll(&mut self) -> Result<Vec<InboundMessage>, ConnectError>;
}

fn return_code(code: ConnectReturnCode) -> (i32, String) {
    let numeric = match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    };
    (numeric, format!("{:?}", code))
}

/// [`BrokerClient`] on top of rumqttc's synchronous client.
///
/// The session only makes progress while [`BrokerClient::poll`] runs, which the
/// bridge does once per loop iteration.
pub struct RumqttBroker {
    session: Option<(Client, Connection)>,
    connect_timeout: Duration,
    poll_timeout: Duration,
}

impl RumqttBroker {
    pub fn new(connect_timeout: Duration, poll_timeout: Duration) -> Self {
        Self {
            session: None,
            connect_timeout,
            poll_timeout,
        }
    }

    fn mqtt_options(options: &ConnectOptions) -> MqttOptions {
        let mut mqtt_options =
            MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
        mqtt_options
            .set_keep_alive(options.keep_alive.max(MIN_KEEP_ALIVE))
            .set_transport(options.transport.clone());
        if let Some(credentials) = &options.credentials {
            mqtt_options.set_credentials(credentials.user.clone(), credentials.password.clone());
        }
        mqtt_options
    }
}

impl BrokerClient for RumqttBroker {
    fn connect(&mut self, options: &ConnectOptions) -> Result<(), ConnectError> {
        self.disconnect();

        let (client, mut connection) =
            Client::new(Self::mqtt_options(options), REQUEST_CHANNEL_CAPACITY);
        let deadline = Instant::now() + self.connect_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectError::Timeout(self.connect_timeout));
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.session = Some((client, connection));
                        return Ok(());
                    }
                    let (code, reason) = return_code(ack.code);
                    return Err(ConnectError::Refused { code, reason });
                }
                Ok(Ok(event)) => debug!("Event while connecting: {:?}", event),
                Ok(Err(ConnectionError::ConnectionRefused(code))) => {
                    let (code, reason) = return_code(code);
                    return Err(ConnectError::Refused { code, reason });
                }
                Ok(Err(e)) => return Err(ConnectError::Io(e.to_string())),
                Err(_) => return Err(ConnectError::Timeout(self.connect_timeout)),
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some((client, mut connection)) = self.session.take() {
            match client.try_disconnect() {
                Ok(()) => drain_until_disconnect(&mut connection, DISCONNECT_TIMEOUT),
                Err(e) => debug!("Disconnect request not queued: {}", e),
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        let Some((client, _)) = self.session.as_ref() else {
            return false;
        };
        match client.try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Publish to {} not accepted: {}", topic, e);
                false
            }
        }
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        let Some((client, _)) = self.session.as_ref() else {
            return false;
        };
        match client.try_subscribe(topic, QoS::AtMostOnce) {
            Ok(()) => true,
            Err(e) => {
                warn!("Subscription to {} not accepted: {}", topic, e);
                false
            }
        }
    }

    fn poll(&mut self) -> Result<Vec<InboundMessage>, ConnectError> {
        let Some((_, connection)) = self.session.as_mut() else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        for _ in 0..MAX_EVENTS_PER_POLL {
            match connection.recv_timeout(self.poll_timeout) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    messages.push(InboundMessage::from_topic(
                        publish.topic,
                        publish.payload.to_vec(),
                    ));
                }
                Ok(Ok(event)) => debug!("MQTT event: {:?}", event),
                Ok(Err(e)) => {
                    self.session = None;
                    return Err(ConnectError::Io(e.to_string()));
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.session = None;
                    return Err(ConnectError::Io("request channel closed".to_string()));
                }
            }
        }
        Ok(messages)
    }
}

/// Pumps the connection until the DISCONNECT packet went out, the connection
/// failed, or `timeout` passed.
fn drain_until_disconnect(connection: &mut Connection, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("DISCONNECT not flushed within {:?}", timeout);
            return;
        }
        match connection.recv_timeout(remaining) {
            Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => {
                debug!("DISCONNECT sent");
                return;
            }
            Ok(Ok(event)) => debug!("Event while disconnecting: {:?}", event),
            Ok(Err(e)) => {
                debug!("Connection closed while disconnecting: {}", e);
                return;
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn refusal_codes_follow_connack() {
        assert_eq!(return_code(ConnectReturnCode::BadUserNamePassword).0, 4);
        assert_eq!(return_code(ConnectReturnCode::NotAuthorized).0, 5);
        let err = ConnectError::Refused {
            code: 5,
            reason: "NotAuthorized".to_string(),
        };
        assert_eq!(err.reason_code(), 5);
        assert_eq!(ConnectError::Timeout(Duration::from_secs(1)).reason_code(), -4);
    }

    #[test]
    fn idle_client_rejects_traffic() {
        let mut broker = RumqttBroker::new(Duration::from_millis(10), Duration::from_millis(10));
        assert!(!broker.is_connected());
        assert!(!broker.publish("nuki/lock/state", b"locked", true));
        assert!(!broker.subscribe("nuki/lock/action"));
        assert!(broker.poll().unwrap().is_empty());
    }

    /// Minimal broker: accepts one client, acknowledges CONNECT and returns
    /// every byte received afterwards until the socket closes.
    fn accept_one(listener: TcpListener) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut buf = [0u8; 256];
            let read = stream.read(&mut buf).unwrap();
            assert!(read > 0 && buf[0] >> 4 == 1, "expected CONNECT");
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();

            let mut received = Vec::new();
            while let Ok(read) = stream.read(&mut buf) {
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..read]);
            }
            received
        })
    }

    #[test]
    fn disconnect_is_sent_before_the_socket_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = accept_one(listener);

        let mut broker = RumqttBroker::new(Duration::from_secs(5), Duration::from_millis(10));
        broker
            .connect(&ConnectOptions {
                client_id: "nukihub".to_string(),
                host: "127.0.0.1".to_string(),
                port,
                credentials: None,
                keep_alive: Duration::from_secs(60),
                transport: Transport::Tcp,
            })
            .unwrap();
        assert!(broker.is_connected());

        broker.disconnect();
        assert!(!broker.is_connected());
        let received = server.join().unwrap();
        assert!(
            received.windows(2).any(|w| w == [0xE0, 0x00]),
            "no DISCONNECT in {:02x?}",
            received
        );
    }
}
