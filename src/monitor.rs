//! Scheduler and fan-out orchestration.
//!
//! One periodic timer drives the pipeline: every tick generates a fresh
//! reading and fans it out to the broker, the store, and the push channel.
//! The fan-out runs in its own task per tick, so a slow sink can never delay
//! the cadence, and the three sink calls are isolated from each other. The
//! same path services on-demand publish requests.

use crate::broker::BrokerConnector;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::link::{ConnectionManager, LinkHandle, LinkState};
use crate::reading::{ReadingGenerator, WindReading};
use crate::sink::{Archiver, Broadcaster, Publisher, ReadingStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Reply of the manual trigger. Fixed even when a sink fails underneath;
/// fan-out failures are observability events, not caller-visible errors.
pub const PUBLISH_SUCCESS: &str = "wind data published";

/// Reply of the read-only status probe.
pub const STATUS_OPERATIONAL: &str = "wind monitoring system operational";

const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Bounded wait applied to each stage of the shutdown sequence.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

enum MonitorCommand {
    PublishNow {
        respond_to: oneshot::Sender<&'static str>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// The wind monitoring service.
pub struct WindMonitor;

impl WindMonitor {
    /// Wire the pipeline and spawn its tasks.
    ///
    /// The connector and store are boundaries; production passes the rumqttc
    /// connector and the JSON-lines store, tests pass scripted
    /// implementations.
    pub fn spawn(
        config: MonitorConfig,
        connector: Box<dyn BrokerConnector>,
        store: Box<dyn ReadingStore>,
    ) -> MonitorHandle {
        let (link, link_task) = ConnectionManager::spawn(&config, connector);
        let broadcaster = Broadcaster::new();

        let runner = Runner {
            generator: ReadingGenerator::new(
                config.simulation.min_speed,
                config.simulation.max_speed,
            ),
            publisher: Publisher::new(link.clone()),
            archiver: Arc::new(Archiver::new(store, config.storage.collection.clone())),
            broadcaster: broadcaster.clone(),
            link: link.clone(),
            tick_interval: config.tick_interval(),
        };

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(runner.run(command_rx));

        MonitorHandle {
            commands: command_tx,
            link,
            broadcaster,
            task,
            link_task,
        }
    }
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    link: LinkHandle,
    broadcaster: Broadcaster,
    task: JoinHandle<()>,
    link_task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Manual trigger: run one extra fan-out now.
    pub async fn publish_now(&self) -> MonitorResult<String> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(MonitorCommand::PublishNow { respond_to })
            .await
            .map_err(|_| MonitorError::MonitorStopped)?;
        let reply = response.await.map_err(|_| MonitorError::MonitorStopped)?;
        Ok(reply.to_string())
    }

    /// Read-only operational probe.
    pub fn status(&self) -> &'static str {
        STATUS_OPERATIONAL
    }

    /// Attach a live push-channel subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<WindReading> {
        self.broadcaster.subscribe()
    }

    /// Echo a submitted sample back through the push channel.
    pub fn submit(&self, speed: f64, direction: f64) -> WindReading {
        self.broadcaster.submit(speed, direction)
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Stop the service: cancel the timers, drain in-flight fan-out tasks,
    /// then close the broker session cleanly. Each stage is bounded, so
    /// shutdown always terminates.
    pub async fn shutdown(mut self) {
        let (respond_to, done) = oneshot::channel();
        if self
            .commands
            .send(MonitorCommand::Shutdown { respond_to })
            .await
            .is_ok()
            && tokio::time::timeout(SHUTDOWN_GRACE, done).await.is_err()
        {
            warn!("monitor did not acknowledge shutdown in time");
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.link_task)
            .await
            .is_err()
        {
            self.link_task.abort();
        }
        info!("wind monitor stopped");
    }
}

struct Runner {
    generator: ReadingGenerator,
    publisher: Publisher,
    archiver: Arc<Archiver>,
    broadcaster: Broadcaster,
    link: LinkHandle,
    tick_interval: Duration,
}

impl Runner {
    async fn run(mut self, mut commands: mpsc::Receiver<MonitorCommand>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        // Reseed against the real clock: if a tick slot is missed the next
        // one fires on schedule instead of bursting to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut inflight: JoinSet<()> = JoinSet::new();
        let mut shutdown_ack: Option<oneshot::Sender<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.fan_out(&mut inflight);
                }
                command = commands.recv() => match command {
                    None => break,
                    Some(MonitorCommand::PublishNow { respond_to }) => {
                        self.fan_out(&mut inflight);
                        let _ = respond_to.send(PUBLISH_SUCCESS);
                    }
                    Some(MonitorCommand::Shutdown { respond_to }) => {
                        shutdown_ack = Some(respond_to);
                        break;
                    }
                },
                Some(result) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(err) = result {
                        warn!(error = %err, "fan-out task failed to complete");
                    }
                }
            }
        }

        drain(&mut inflight).await;
        if let Err(err) = self.link.shutdown().await {
            debug!(error = %err, "broker link already stopped");
        }
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Generate one reading and deliver it to all three sinks concurrently.
    ///
    /// Sinks share nothing but the immutable reading; each failure is logged
    /// on its own and never reaches the other two or the timer.
    fn fan_out(&mut self, inflight: &mut JoinSet<()>) {
        let reading = self.generator.next_reading();
        let publisher = self.publisher.clone();
        let archiver = self.archiver.clone();
        let broadcaster = self.broadcaster.clone();

        inflight.spawn(async move {
            let (published, archived, receivers) = tokio::join!(
                publisher.publish(&reading),
                archiver.archive(&reading),
                async { broadcaster.broadcast(&reading) },
            );

            if let Err(err) = published {
                warn!(error = %err, sink = "broker", "sink delivery failed");
            }
            if let Err(err) = archived {
                warn!(error = %err, sink = "store", "sink delivery failed");
            }
            debug!(receivers, sink = "push", "reading broadcast");

            info!(
                speed = reading.speed,
                direction = reading.direction,
                timestamp = reading.timestamp,
                "wind reading fanned out"
            );
        });
    }
}

async fn drain(inflight: &mut JoinSet<()>) {
    if inflight.is_empty() {
        return;
    }
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while inflight.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("in-flight fan-out did not drain in time, aborting");
        inflight.abort_all();
    }
}
