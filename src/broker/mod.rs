//! Broker boundary.
//!
//! The connection manager talks to the broker exclusively through the
//! `BrokerConnector` and `BrokerTransport` traits, so the recovery logic can
//! be exercised against a scripted implementation while production runs on
//! the rumqttc adapter in [`rumqtt`].

use crate::error::MonitorResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod rumqtt;

/// Fixed topics used by the service.
pub mod topics {
    /// Combined structured reading, QoS 1, retained.
    pub const DATA: &str = "wind/data";
    /// Raw speed metric, subscribed.
    pub const SPEED: &str = "wind/speed";
    /// Raw direction metric, subscribed.
    pub const DIRECTION: &str = "wind/direction";
    /// Liveness marker, retained. Carries the last-will payload on unclean
    /// disconnect.
    pub const STATUS: &str = "wind/status";

    pub const STATUS_ONLINE: &str = "sensor-online";
    pub const STATUS_OFFLINE: &str = "sensor-offline";
}

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Message the broker delivers on our behalf if the session drops without a
/// clean disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub qos: QosLevel,
    pub retained: bool,
}

impl LastWill {
    /// The service's liveness will: retained `sensor-offline` on the status
    /// topic.
    pub fn offline_marker() -> Self {
        Self {
            topic: topics::STATUS.to_string(),
            payload: topics::STATUS_OFFLINE.to_string(),
            qos: QosLevel::ExactlyOnce,
            retained: true,
        }
    }
}

/// Everything a connect attempt needs to establish one broker session.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub broker_url: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connection_timeout: Duration,
    pub last_will: LastWill,
}

/// Events surfaced by an established session's transport driver.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// An inbound message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// The broker acknowledged one of our QoS >= 1 publishes.
    DeliveryAck { packet_id: u16 },
    /// The session dropped outside of a clean disconnect.
    ConnectionLost { cause: String },
}

/// Handle to one established broker session.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn subscribe(&self, topic: &str, qos: QosLevel) -> MonitorResult<()>;

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> MonitorResult<()>;

    /// Clean disconnect. Withdraws the last will on the broker side.
    async fn disconnect(&self) -> MonitorResult<()>;
}

/// Factory for broker sessions.
///
/// `connect` resolves once the session handshake completes or fails; the
/// returned receiver yields the session's events until the connection is
/// lost, after which the driver stops and the caller owns retry pacing.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        options: &LinkOptions,
    ) -> MonitorResult<(Box<dyn BrokerTransport>, mpsc::Receiver<BrokerEvent>)>;
}
