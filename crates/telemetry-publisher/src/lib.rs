//! Telemetry Publishing
//!
//! Sink abstraction for forwarding smoothed readings to a message broker:
//! - `TelemetrySink` trait with explicit connect/publish/disconnect
//! - MQTT implementation on top of `rumqttc`
//! - Fixed-precision CSV payload shared with downstream consumers

mod address;
mod mqtt;
mod payload;

pub use address::{AddressError, BrokerAddress};
pub use mqtt::{MqttPublisher, ACK_TIMEOUT, CONNECT_TIMEOUT};
pub use payload::{PayloadError, ReadingPayload};

use std::time::Duration;
use thiserror::Error;

/// Publishing error types
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Invalid broker address: {0}")]
    Address(#[from] AddressError),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Broker refused connection: {0}")]
    Refused(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("No broker acknowledgement within {0:?}")]
    Timeout(Duration),
}

/// Delivery confidence level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryQos {
    /// Fire and forget
    #[default]
    AtMostOnce,
    /// Wait for PUBACK
    AtLeastOnce,
    /// Wait for PUBCOMP
    ExactlyOnce,
}

impl DeliveryQos {
    /// Map a numeric level: 0 → at-most-once, 1 → at-least-once, 2+ → exactly-once
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => DeliveryQos::AtMostOnce,
            1 => DeliveryQos::AtLeastOnce,
            _ => DeliveryQos::ExactlyOnce,
        }
    }

    /// Numeric level of this QoS
    pub fn level(self) -> u8 {
        match self {
            DeliveryQos::AtMostOnce => 0,
            DeliveryQos::AtLeastOnce => 1,
            DeliveryQos::ExactlyOnce => 2,
        }
    }

    /// Whether publishing waits for a broker acknowledgement
    pub fn requires_ack(self) -> bool {
        self != DeliveryQos::AtMostOnce
    }
}

/// Destination for published telemetry
///
/// Every call reports its own outcome; callers decide whether a failure
/// matters. Implementations release their connection when dropped.
pub trait TelemetrySink {
    /// Connect to a broker, e.g. `tcp://localhost:1883`
    fn connect(
        &mut self,
        broker_uri: &str,
        client_id: &str,
        keep_alive: Duration,
    ) -> Result<(), PublishError>;

    /// Publish a payload to a topic
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: DeliveryQos,
        retain: bool,
    ) -> Result<(), PublishError>;

    /// Close the connection (no-op when not connected)
    fn disconnect(&mut self);

    /// Check if the sink is connected
    fn is_connected(&self) -> bool;
}
