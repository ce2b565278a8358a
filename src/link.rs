//! Broker connection supervision.
//!
//! One supervisor task owns the broker session for the whole process:
//! it connects, restores subscriptions, serves publish commands, watches for
//! connection loss, and paces reconnect attempts. Everything else reaches the
//! broker through a [`LinkHandle`], so the transport is never shared mutable
//! state.
//!
//! State machine: `Disconnected -> Connecting -> Connected -> Disconnected`
//! on loss, then back through `Connecting` after the reconnect delay. The
//! machine only terminates on an explicit shutdown, which performs a clean
//! disconnect and therefore withdraws the broker-side last will.
//!
//! Reconnects run on a single-shot timer with a fixed delay. There is no
//! backoff growth; an unreachable broker is retried at a constant interval
//! indefinitely. At most one attempt is ever in flight: the timer lives in
//! the one supervisor task, and `request_reconnect` is a compare-and-swap
//! no-op while a timer is already armed.

use crate::broker::{
    topics, BrokerConnector, BrokerEvent, BrokerTransport, LastWill, LinkOptions, QosLevel,
};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::reading::parse_metric;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Connection lifecycle state, owned exclusively by the supervisor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

enum LinkCommand {
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
        respond_to: oneshot::Sender<MonitorResult<()>>,
    },
    Reconnect,
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the connection supervisor.
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::Sender<LinkCommand>,
    state: watch::Receiver<LinkState>,
    reconnect_armed: Arc<AtomicBool>,
}

impl LinkHandle {
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Publish through the supervised session.
    ///
    /// While disconnected, the supervisor first attempts an immediate
    /// connect; if that also fails the error comes back here and the
    /// reconnect timer is re-armed.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> MonitorResult<()> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(LinkCommand::Publish {
                topic: topic.to_string(),
                payload,
                qos,
                retain,
                respond_to,
            })
            .await
            .map_err(|_| MonitorError::LinkClosed)?;
        response.await.map_err(|_| MonitorError::LinkClosed)?
    }

    /// Ask the supervisor to cycle the session.
    ///
    /// Idempotent: while a reconnect timer is already armed this is a no-op,
    /// so concurrent callers cannot accumulate reconnect attempts.
    pub fn request_reconnect(&self) {
        if self
            .reconnect_armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            && self.commands.try_send(LinkCommand::Reconnect).is_err()
        {
            // Supervisor gone or mailbox full; let its own loss detection
            // handle the cycle.
            self.reconnect_armed.store(false, Ordering::SeqCst);
        }
    }

    /// Stop the supervisor with a clean disconnect.
    pub async fn shutdown(&self) -> MonitorResult<()> {
        let (respond_to, done) = oneshot::channel();
        self.commands
            .send(LinkCommand::Shutdown { respond_to })
            .await
            .map_err(|_| MonitorError::LinkClosed)?;
        done.await.map_err(|_| MonitorError::LinkClosed)
    }
}

struct Session {
    transport: Box<dyn BrokerTransport>,
    events: mpsc::Receiver<BrokerEvent>,
}

enum ServeExit {
    Lost,
    Shutdown,
}

enum Backoff {
    Retry,
    Shutdown,
    Connected(Session),
}

/// Supervisor for the broker connection lifecycle.
pub struct ConnectionManager {
    connector: Box<dyn BrokerConnector>,
    options: LinkOptions,
    subscriptions: Vec<(&'static str, QosLevel)>,
    reconnect_delay: Duration,
    state_tx: watch::Sender<LinkState>,
    commands: mpsc::Receiver<LinkCommand>,
    reconnect_armed: Arc<AtomicBool>,
    was_connected: bool,
}

impl ConnectionManager {
    /// Spawn the supervisor task for the configured broker.
    pub fn spawn(
        config: &MonitorConfig,
        connector: Box<dyn BrokerConnector>,
    ) -> (LinkHandle, JoinHandle<()>) {
        let options = LinkOptions {
            broker_url: config.broker.url.clone(),
            client_id: format!(
                "{}-{}",
                config.broker.client_id_prefix,
                uuid::Uuid::new_v4()
            ),
            keep_alive: config.keep_alive(),
            connection_timeout: config.connection_timeout(),
            last_will: LastWill::offline_marker(),
        };

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let reconnect_armed = Arc::new(AtomicBool::new(false));

        let manager = Self {
            connector,
            options,
            subscriptions: vec![
                (topics::SPEED, QosLevel::AtLeastOnce),
                (topics::DIRECTION, QosLevel::AtLeastOnce),
            ],
            reconnect_delay: config.reconnect_delay(),
            state_tx,
            commands: command_rx,
            reconnect_armed: reconnect_armed.clone(),
            was_connected: false,
        };

        let handle = LinkHandle {
            commands: command_tx,
            state: state_rx,
            reconnect_armed,
        };
        let task = tokio::spawn(manager.run());
        (handle, task)
    }

    async fn run(mut self) {
        let mut next_session: Option<Session> = None;
        loop {
            let session = match next_session.take() {
                Some(session) => session,
                None => {
                    self.state_tx.send_replace(LinkState::Connecting);
                    self.reconnect_armed.store(false, Ordering::SeqCst);
                    match self.establish().await {
                        Ok(session) => session,
                        Err(err) => {
                            warn!(
                                error = %err,
                                broker = %self.options.broker_url,
                                "broker connection failed"
                            );
                            self.state_tx.send_replace(LinkState::Disconnected);
                            match self.backoff().await {
                                Backoff::Retry => continue,
                                Backoff::Connected(session) => session,
                                Backoff::Shutdown => break,
                            }
                        }
                    }
                }
            };

            self.state_tx.send_replace(LinkState::Connected);
            if self.was_connected {
                info!(broker = %self.options.broker_url, "reconnected to broker");
            } else {
                info!(broker = %self.options.broker_url, "connected to broker");
                self.was_connected = true;
            }

            match self.serve(session).await {
                ServeExit::Shutdown => break,
                ServeExit::Lost => {
                    self.state_tx.send_replace(LinkState::Disconnected);
                    match self.backoff().await {
                        Backoff::Retry => {}
                        Backoff::Connected(session) => next_session = Some(session),
                        Backoff::Shutdown => break,
                    }
                }
            }
        }
        self.state_tx.send_replace(LinkState::Disconnected);
        debug!("connection supervisor stopped");
    }

    /// Connect, restore subscriptions, and mark the sensor online.
    ///
    /// A connected but unsubscribed session is unhealthy, so a subscribe
    /// failure here fails the whole attempt and takes the reconnect path.
    async fn establish(&mut self) -> MonitorResult<Session> {
        let (transport, events) = self.connector.connect(&self.options).await?;
        for (topic, qos) in &self.subscriptions {
            transport.subscribe(topic, *qos).await?;
        }
        debug!("topic subscriptions restored");

        // The last will only covers unclean exits; publishing the retained
        // online marker keeps the status topic meaningful in both directions.
        transport
            .publish(
                topics::STATUS,
                topics::STATUS_ONLINE.as_bytes().to_vec(),
                QosLevel::AtLeastOnce,
                true,
            )
            .await?;

        Ok(Session { transport, events })
    }

    async fn serve(&mut self, mut session: Session) -> ServeExit {
        loop {
            tokio::select! {
                event = session.events.recv() => match event {
                    None => {
                        warn!("broker event stream ended");
                        return ServeExit::Lost;
                    }
                    Some(BrokerEvent::ConnectionLost { cause }) => {
                        warn!(%cause, "broker connection lost");
                        return ServeExit::Lost;
                    }
                    Some(BrokerEvent::Message { topic, payload }) => {
                        self.handle_message(&topic, &payload);
                    }
                    Some(BrokerEvent::DeliveryAck { packet_id }) => {
                        debug!(packet_id, "delivery confirmed");
                    }
                },
                command = self.commands.recv() => match command {
                    None => {
                        // Every handle is gone; close the session cleanly.
                        let _ = session.transport.disconnect().await;
                        return ServeExit::Shutdown;
                    }
                    Some(LinkCommand::Shutdown { respond_to }) => {
                        if let Err(err) = session.transport.disconnect().await {
                            warn!(error = %err, "clean disconnect failed");
                        }
                        let _ = respond_to.send(());
                        return ServeExit::Shutdown;
                    }
                    Some(LinkCommand::Reconnect) => {
                        info!("reconnect requested, cycling broker session");
                        return ServeExit::Lost;
                    }
                    Some(LinkCommand::Publish { topic, payload, qos, retain, respond_to }) => {
                        let result = session
                            .transport
                            .publish(&topic, payload, qos, retain)
                            .await;
                        let publish_failed = result.is_err();
                        let _ = respond_to.send(result);
                        if publish_failed {
                            warn!(%topic, "publish failed, cycling broker session");
                            return ServeExit::Lost;
                        }
                    }
                }
            }
        }
    }

    /// Wait out the single-shot reconnect timer.
    ///
    /// A publish command arriving while disconnected cuts the wait short
    /// with an eager connect attempt; on failure the error propagates to the
    /// publisher and the timer is re-armed.
    async fn backoff(&mut self) -> Backoff {
        self.reconnect_armed.store(true, Ordering::SeqCst);
        let mut deadline = Instant::now() + self.reconnect_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Backoff::Retry,
                command = self.commands.recv() => match command {
                    None => return Backoff::Shutdown,
                    Some(LinkCommand::Shutdown { respond_to }) => {
                        let _ = respond_to.send(());
                        return Backoff::Shutdown;
                    }
                    Some(LinkCommand::Reconnect) => {
                        // Timer already armed; duplicate requests are no-ops.
                    }
                    Some(LinkCommand::Publish { topic, payload, qos, retain, respond_to }) => {
                        self.state_tx.send_replace(LinkState::Connecting);
                        self.reconnect_armed.store(false, Ordering::SeqCst);
                        match self.establish().await {
                            Ok(session) => {
                                let result = session
                                    .transport
                                    .publish(&topic, payload, qos, retain)
                                    .await;
                                let publish_failed = result.is_err();
                                let _ = respond_to.send(result);
                                if publish_failed {
                                    warn!(%topic, "publish failed after eager reconnect");
                                    self.state_tx.send_replace(LinkState::Disconnected);
                                    self.reconnect_armed.store(true, Ordering::SeqCst);
                                    deadline = Instant::now() + self.reconnect_delay;
                                } else {
                                    return Backoff::Connected(session);
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "eager connect for publish failed");
                                let _ = respond_to.send(Err(err));
                                self.state_tx.send_replace(LinkState::Disconnected);
                                self.reconnect_armed.store(true, Ordering::SeqCst);
                                deadline = Instant::now() + self.reconnect_delay;
                            }
                        }
                    }
                }
            }
        }
    }

    fn handle_message(&self, topic: &str, payload: &[u8]) {
        match parse_metric(topic, payload) {
            Ok(value) => match topic {
                topics::SPEED => info!(value, "wind speed updated (km/h)"),
                topics::DIRECTION => info!(value, "wind direction updated (degrees)"),
                _ => debug!(%topic, value, "message on unexpected topic"),
            },
            Err(err) => warn!(error = %err, "dropping malformed reading payload"),
        }
    }
}
