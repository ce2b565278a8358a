//! rumqttc-backed broker adapter.
//!
//! Each connect attempt builds a fresh client and event loop, waits for the
//! CONNACK handshake under the configured timeout, then hands the event loop
//! to a driver task that translates packets into [`BrokerEvent`]s. The driver
//! stops after surfacing a connection loss, leaving reconnect pacing entirely
//! to the connection manager.

use crate::broker::{BrokerConnector, BrokerEvent, BrokerTransport, LinkOptions, QosLevel};
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Production connector speaking MQTT via rumqttc.
#[derive(Debug, Default)]
pub struct RumqttConnector;

impl RumqttConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for RumqttConnector {
    async fn connect(
        &self,
        options: &LinkOptions,
    ) -> MonitorResult<(Box<dyn BrokerTransport>, mpsc::Receiver<BrokerEvent>)> {
        let (host, port) = parse_broker_url(&options.broker_url)?;

        let mut mqtt_options = MqttOptions::new(options.client_id.clone(), host, port);
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_clean_session(true);
        mqtt_options.set_last_will(rumqttc::LastWill::new(
            options.last_will.topic.clone(),
            options.last_will.payload.clone(),
            to_rumqtt_qos(options.last_will.qos),
            options.last_will.retained,
        ));

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, EVENT_CHANNEL_CAPACITY);

        // The session only exists once the broker answers the handshake.
        let handshake = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(err) => return Err(MonitorError::Broker(err.to_string())),
                }
            }
        };
        tokio::time::timeout(options.connection_timeout, handshake)
            .await
            .map_err(|_| MonitorError::ConnectTimeout(options.connection_timeout))??;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(drive_event_loop(event_loop, event_tx));

        Ok((Box::new(RumqttTransport { client }), event_rx))
    }
}

/// Pump the rumqttc event loop, forwarding the packets the manager cares
/// about. Exits when the session errors out or the receiver is dropped.
async fn drive_event_loop(mut event_loop: EventLoop, events: mpsc::Sender<BrokerEvent>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let event = BrokerEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let event = BrokerEvent::DeliveryAck {
                    packet_id: ack.pkid,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                let _ = events
                    .send(BrokerEvent::ConnectionLost {
                        cause: err.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
}

struct RumqttTransport {
    client: AsyncClient,
}

#[async_trait]
impl BrokerTransport for RumqttTransport {
    async fn subscribe(&self, topic: &str, qos: QosLevel) -> MonitorResult<()> {
        self.client
            .subscribe(topic, to_rumqtt_qos(qos))
            .await
            .map_err(|err| MonitorError::Subscribe {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> MonitorResult<()> {
        self.client
            .publish(topic, to_rumqtt_qos(qos), retain, payload)
            .await
            .map_err(|err| MonitorError::Broker(err.to_string()))
    }

    async fn disconnect(&self) -> MonitorResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|err| MonitorError::Broker(err.to_string()))
    }
}

fn to_rumqtt_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Split a broker endpoint into host and port.
///
/// Accepts `tcp://host:port`, `mqtt://host:port`, or a bare `host[:port]`;
/// the port defaults to 1883.
fn parse_broker_url(url: &str) -> MonitorResult<(String, u16)> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(MonitorError::Configuration(
            "broker url must not be blank".to_string(),
        ));
    }

    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    match without_scheme.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                MonitorError::Configuration(format!("invalid broker port in '{}'", url))
            })?;
            Ok((host.to_string(), port))
        }
        _ => Ok((without_scheme.to_string(), 1883)),
    }
}
