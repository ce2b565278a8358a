//! Shared test doubles for the broker and store boundaries.
//!
//! `MockBroker` is a scripted connector: tests can make connect attempts
//! fail, break subscribe or publish calls, and inject session events, while
//! every interaction is recorded for assertions. `RecordingStore` does the
//! same for the persistence boundary.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use wind_monitor::broker::{
    BrokerConnector, BrokerEvent, BrokerTransport, LinkOptions, QosLevel,
};
use wind_monitor::config::MonitorConfig;
use wind_monitor::error::{MonitorError, MonitorResult};
use wind_monitor::reading::WindReading;
use wind_monitor::sink::ReadingStore;

/// Baseline configuration used across the integration tests.
pub fn test_config() -> MonitorConfig {
    let toml_str = r#"
        [broker]
        url = "tcp://broker.test:1883"

        [simulation]
        interval_secs = 5
        min_speed = 10.0
        max_speed = 50.0
    "#;
    toml::from_str(toml_str).expect("test config should parse")
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
}

#[derive(Default)]
struct BrokerState {
    connect_attempts: AtomicUsize,
    connect_failures_left: AtomicUsize,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
    clean_disconnects: AtomicUsize,
    subscriptions: Mutex<Vec<String>>,
    publishes: Mutex<Vec<RecordedPublish>>,
    last_options: Mutex<Option<LinkOptions>>,
    event_tx: Mutex<Option<mpsc::Sender<BrokerEvent>>>,
}

/// Scripted broker double shared between the test and the service.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<BrokerState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.connect_failures_left.store(n, Ordering::SeqCst);
    }

    /// Make every connect attempt fail for the rest of the test.
    pub fn fail_connects_forever(&self) {
        self.state
            .connect_failures_left
            .store(usize::MAX, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn clean_disconnects(&self) -> usize {
        self.state.clean_disconnects.load(Ordering::SeqCst)
    }

    /// Cumulative subscription log across all sessions.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }

    pub fn publishes(&self) -> Vec<RecordedPublish> {
        self.state.publishes.lock().unwrap().clone()
    }

    pub fn publishes_to(&self, topic: &str) -> Vec<RecordedPublish> {
        self.publishes()
            .into_iter()
            .filter(|publish| publish.topic == topic)
            .collect()
    }

    /// Options of the most recent connect attempt.
    pub fn last_options(&self) -> Option<LinkOptions> {
        self.state.last_options.lock().unwrap().clone()
    }

    /// Simulate an unexpected session drop.
    pub async fn drop_connection(&self, cause: &str) {
        let event_tx = self.state.event_tx.lock().unwrap().clone();
        let event_tx = event_tx.expect("no live session to drop");
        event_tx
            .send(BrokerEvent::ConnectionLost {
                cause: cause.to_string(),
            })
            .await
            .expect("session event receiver should be alive");
    }

    /// Deliver an inbound message on a subscribed topic.
    pub async fn inject_message(&self, topic: &str, payload: &[u8]) {
        let event_tx = self.state.event_tx.lock().unwrap().clone();
        let event_tx = event_tx.expect("no live session to message");
        event_tx
            .send(BrokerEvent::Message {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            })
            .await
            .expect("session event receiver should be alive");
    }
}

#[async_trait]
impl BrokerConnector for MockBroker {
    async fn connect(
        &self,
        options: &LinkOptions,
    ) -> MonitorResult<(Box<dyn BrokerTransport>, mpsc::Receiver<BrokerEvent>)> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        *self.state.last_options.lock().unwrap() = Some(options.clone());

        let failed = self
            .state
            .connect_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(MonitorError::Broker("connection refused".into()));
        }

        let (event_tx, event_rx) = mpsc::channel(16);
        *self.state.event_tx.lock().unwrap() = Some(event_tx);
        let transport = MockTransport {
            state: self.state.clone(),
        };
        Ok((Box::new(transport), event_rx))
    }
}

struct MockTransport {
    state: Arc<BrokerState>,
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn subscribe(&self, topic: &str, _qos: QosLevel) -> MonitorResult<()> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(MonitorError::Subscribe {
                topic: topic.to_string(),
                reason: "subscribe refused".into(),
            });
        }
        self.state
            .subscriptions
            .lock()
            .unwrap()
            .push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> MonitorResult<()> {
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(MonitorError::Broker("publish refused".into()));
        }
        self.state.publishes.lock().unwrap().push(RecordedPublish {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&self) -> MonitorResult<()> {
        self.state.clean_disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    init_calls: AtomicUsize,
    fail_init: AtomicBool,
    appends: Mutex<Vec<(String, WindReading)>>,
}

/// Recording store double for the persistence boundary.
#[derive(Clone, Default)]
pub struct RecordingStore {
    state: Arc<StoreState>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose initialization always fails.
    pub fn failing_init() -> Self {
        let store = Self::default();
        store.state.fail_init.store(true, Ordering::SeqCst);
        store
    }

    pub fn init_calls(&self) -> usize {
        self.state.init_calls.load(Ordering::SeqCst)
    }

    pub fn append_count(&self) -> usize {
        self.state.appends.lock().unwrap().len()
    }

    pub fn appended(&self) -> Vec<(String, WindReading)> {
        self.state.appends.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadingStore for RecordingStore {
    async fn init(&self) -> MonitorResult<()> {
        self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_init.load(Ordering::SeqCst) {
            return Err(MonitorError::Store("no credentials".into()));
        }
        Ok(())
    }

    async fn append(&self, collection: &str, reading: &WindReading) -> MonitorResult<String> {
        let mut appends = self.state.appends.lock().unwrap();
        appends.push((collection.to_string(), *reading));
        Ok(format!("key-{}", appends.len()))
    }
}
