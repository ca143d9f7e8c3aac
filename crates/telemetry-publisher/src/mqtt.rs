//! MQTT publisher built on the rumqttc synchronous client

use crate::{BrokerAddress, DeliveryQos, PublishError, TelemetrySink};
use rumqttc::{Client, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long `connect` waits for CONNACK
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a QoS 1/2 publish waits for PUBACK/PUBCOMP
pub const ACK_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long a graceful disconnect waits for the event loop to stop
const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Keep-alive used when the caller passes zero
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Pending request slots between the client and its event loop
const REQUEST_CAPACITY: usize = 10;

/// Notifications forwarded by the event loop thread
#[derive(Debug)]
enum LinkEvent {
    Connected(ConnectReturnCode),
    Sent(u16),
    Acked(u16),
    Closed,
    Failed(String),
}

/// Pairs outgoing packet ids with broker acknowledgements
///
/// A QoS 1/2 publish that times out before its packet went out leaves an
/// orphaned `Sent` notification behind. Those are skipped so a later publish
/// never adopts another publish's packet id.
#[derive(Debug, Default)]
struct AckTracker {
    /// Timed-out publishes whose packet id was never seen
    orphaned: usize,
    /// Packet id of the publish being awaited
    pending: Option<u16>,
}

impl AckTracker {
    /// Start waiting for a new publish
    fn begin(&mut self) {
        self.pending = None;
    }

    /// Feed a notification; true once the awaited publish is acknowledged
    fn observe(&mut self, event: &LinkEvent) -> bool {
        match *event {
            // QoS 0 packets go out with id 0
            LinkEvent::Sent(0) => false,
            LinkEvent::Sent(id) => {
                if self.orphaned > 0 {
                    self.orphaned -= 1;
                } else if self.pending.is_none() {
                    self.pending = Some(id);
                }
                false
            }
            LinkEvent::Acked(id) => self.pending == Some(id),
            _ => false,
        }
    }

    /// Account for a notification that arrived between publishes
    fn discard(&mut self, event: &LinkEvent) {
        if matches!(*event, LinkEvent::Sent(id) if id != 0) && self.orphaned > 0 {
            self.orphaned -= 1;
        }
    }

    /// Give up on the awaited publish
    fn abandon(&mut self) {
        if self.pending.take().is_none() {
            self.orphaned += 1;
        }
    }
}

/// A live client plus the thread driving its network event loop
struct Link {
    client: Client,
    events: Receiver<LinkEvent>,
    worker: Option<JoinHandle<()>>,
    acks: AckTracker,
}

impl Link {
    fn open(address: &BrokerAddress, client_id: &str, keep_alive: Duration) -> Result<Self, PublishError> {
        let mut options = MqttOptions::new(client_id, address.host.clone(), address.port);
        options.set_keep_alive(keep_alive);
        options.set_clean_session(true);

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let (tx, events) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("mqtt-link".to_string())
            .spawn(move || {
                for notification in connection.iter() {
                    let event = match notification {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => LinkEvent::Connected(ack.code),
                        Ok(Event::Incoming(Packet::PubAck(ack))) => LinkEvent::Acked(ack.pkid),
                        Ok(Event::Incoming(Packet::PubComp(comp))) => LinkEvent::Acked(comp.pkid),
                        Ok(Event::Outgoing(Outgoing::Publish(pkid))) => LinkEvent::Sent(pkid),
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            let _ = tx.send(LinkEvent::Closed);
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            let _ = tx.send(LinkEvent::Failed(e.to_string()));
                            break;
                        }
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                debug!("MQTT event loop stopped");
            })
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            events,
            worker: Some(worker),
            acks: AckTracker::default(),
        })
    }

    fn await_connack(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(LinkEvent::Connected(ConnectReturnCode::Success)) => return Ok(()),
                Ok(LinkEvent::Connected(code)) => {
                    return Err(PublishError::Refused(format!("{code:?}")))
                }
                Ok(LinkEvent::Failed(reason)) => return Err(PublishError::Connection(reason)),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Err(PublishError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PublishError::Connection("event loop stopped".to_string()))
                }
            }
        }
    }

    /// Discard notifications left over from earlier publishes
    fn drain_stale(&mut self) -> Result<(), PublishError> {
        loop {
            match self.events.try_recv() {
                Ok(LinkEvent::Failed(reason)) => return Err(PublishError::Connection(reason)),
                Ok(LinkEvent::Closed) => {
                    return Err(PublishError::Connection("connection closed".to_string()))
                }
                Ok(event) => self.acks.discard(&event),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(PublishError::Connection("event loop stopped".to_string()))
                }
            }
        }
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: DeliveryQos,
        retain: bool,
        ack_timeout: Duration,
    ) -> Result<(), PublishError> {
        self.drain_stale()?;

        self.client
            .try_publish(topic, mqtt_qos(qos), retain, payload.to_vec())
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        if !qos.requires_ack() {
            return Ok(());
        }
        self.await_ack(ack_timeout)
    }

    /// Wait for our packet id to go out and come back acknowledged
    fn await_ack(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let deadline = Instant::now() + timeout;
        self.acks.begin();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(LinkEvent::Failed(reason)) => return Err(PublishError::Connection(reason)),
                Ok(LinkEvent::Closed) => {
                    return Err(PublishError::Connection("connection closed".to_string()))
                }
                Ok(event) => {
                    if self.acks.observe(&event) {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.acks.abandon();
                    return Err(PublishError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PublishError::Connection("event loop stopped".to_string()))
                }
            }
        }
    }

    /// Stop the link; with `graceful` a DISCONNECT is sent first
    fn close(mut self, graceful: bool) {
        if graceful && self.client.disconnect().is_ok() {
            let deadline = Instant::now() + DISCONNECT_TIMEOUT;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.events.recv_timeout(remaining) {
                    Ok(LinkEvent::Closed | LinkEvent::Failed(_))
                    | Err(RecvTimeoutError::Disconnected) => {
                        if let Some(worker) = self.worker.take() {
                            let _ = worker.join();
                        }
                        break;
                    }
                    Ok(_) => continue,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!("MQTT event loop did not stop within {:?}", DISCONNECT_TIMEOUT);
                        break;
                    }
                }
            }
        }
        // Dropping the client closes the request channel, which ends a
        // still-running event loop on its next poll.
    }
}

fn mqtt_qos(qos: DeliveryQos) -> QoS {
    match qos {
        DeliveryQos::AtMostOnce => QoS::AtMostOnce,
        DeliveryQos::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryQos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// MQTT telemetry sink
///
/// Owns the broker connection; dropping the publisher disconnects.
pub struct MqttPublisher {
    link: Option<Link>,
    connected: bool,
    connect_timeout: Duration,
    ack_timeout: Duration,
}

impl MqttPublisher {
    /// Create a disconnected publisher with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT, ACK_TIMEOUT)
    }

    /// Create a disconnected publisher with custom timeouts
    pub fn with_timeouts(connect_timeout: Duration, ack_timeout: Duration) -> Self {
        Self {
            link: None,
            connected: false,
            connect_timeout,
            ack_timeout,
        }
    }
}

impl Default for MqttPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for MqttPublisher {
    fn connect(
        &mut self,
        broker_uri: &str,
        client_id: &str,
        keep_alive: Duration,
    ) -> Result<(), PublishError> {
        if self.connected {
            return Ok(());
        }
        if let Some(stale) = self.link.take() {
            stale.close(false);
        }

        let address: BrokerAddress = broker_uri.parse()?;
        let client_id = if client_id.is_empty() {
            format!("telemetry-{}", Uuid::new_v4().simple())
        } else {
            client_id.to_string()
        };
        let keep_alive = if keep_alive.is_zero() {
            DEFAULT_KEEP_ALIVE
        } else {
            keep_alive.max(Duration::from_secs(1))
        };

        debug!("Connecting to MQTT broker {} as {}", address, client_id);
        let mut link = Link::open(&address, &client_id, keep_alive)?;
        if let Err(e) = link.await_connack(self.connect_timeout) {
            warn!("MQTT connect to {} failed: {}", address, e);
            link.close(false);
            return Err(e);
        }

        info!("Connected to MQTT broker: {}", address);
        self.link = Some(link);
        self.connected = true;
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: DeliveryQos,
        retain: bool,
    ) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::NotConnected);
        }
        let ack_timeout = self.ack_timeout;
        let link = self.link.as_mut().ok_or(PublishError::NotConnected)?;

        let result = link.publish(topic, payload, qos, retain, ack_timeout);
        if let Err(PublishError::Connection(reason)) = &result {
            warn!("MQTT link lost: {}", reason);
            self.connected = false;
        }
        result
    }

    fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.close(self.connected);
            info!("Disconnected from MQTT broker");
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.disconnect();
    }
}
