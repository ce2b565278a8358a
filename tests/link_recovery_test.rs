//! Integration tests for broker connection supervision.
//!
//! All tests run on paused time, so reconnect delays are exercised exactly
//! rather than slept through.

mod common;

use common::{test_config, MockBroker};
use std::time::Duration;
use tokio::time::advance;
use wind_monitor::broker::{topics, QosLevel};
use wind_monitor::link::{ConnectionManager, LinkState};

/// Let spawned tasks run to their next await point.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn connect_restores_subscriptions_and_marks_online() {
    let broker = MockBroker::new();
    let (link, task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;

    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(broker.connect_attempts(), 1);
    assert_eq!(
        broker.subscriptions(),
        vec!["wind/speed".to_string(), "wind/direction".to_string()]
    );

    let status = broker.publishes_to(topics::STATUS);
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].payload, b"sensor-online");
    assert!(status[0].retain);

    link.shutdown().await.expect("shutdown");
    task.await.expect("supervisor exits");
}

#[tokio::test(start_paused = true)]
async fn connect_options_carry_client_id_and_last_will() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;

    let options = broker.last_options().expect("connect was attempted");
    assert_eq!(options.broker_url, "tcp://broker.test:1883");
    assert!(options.client_id.starts_with("wind-sensor-"));
    assert!(options.client_id.len() > "wind-sensor-".len());
    assert_eq!(options.keep_alive, Duration::from_secs(60));
    assert_eq!(options.connection_timeout, Duration::from_secs(10));

    // The will is what subscribers of the status topic observe after an
    // unclean drop, retained until the next online marker.
    assert_eq!(options.last_will.topic, "wind/status");
    assert_eq!(options.last_will.payload, "sensor-offline");
    assert_eq!(options.last_will.qos, QosLevel::ExactlyOnce);
    assert!(options.last_will.retained);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn connection_loss_reconnects_after_the_fixed_delay() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    broker.drop_connection("keepalive timeout").await;
    settle().await;
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(broker.connect_attempts(), 1);

    // Just short of the 5 s delay nothing happens.
    advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 1);

    advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(link.state(), LinkState::Connected);

    // Both topics are live again on the new session.
    assert_eq!(broker.subscriptions().len(), 4);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn resubscribed_session_still_handles_inbound_messages() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;

    broker.drop_connection("broker restart").await;
    settle().await;
    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    broker.inject_message(topics::SPEED, b"42.5").await;
    broker.inject_message(topics::DIRECTION, b"270").await;
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn duplicate_reconnect_requests_collapse_into_one_attempt() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;
    assert_eq!(broker.connect_attempts(), 1);

    broker.drop_connection("server going away").await;
    settle().await;
    assert_eq!(link.state(), LinkState::Disconnected);

    // The timer is armed; both requests are no-ops.
    link.request_reconnect();
    link.request_reconnect();
    settle().await;
    assert_eq!(broker.connect_attempts(), 1);

    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn reconnect_request_while_connected_cycles_the_session_once() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;
    assert_eq!(broker.connect_attempts(), 1);

    link.request_reconnect();
    link.request_reconnect();
    settle().await;
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(broker.connect_attempts(), 1);

    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn subscribe_failure_takes_the_reconnect_path() {
    let broker = MockBroker::new();
    broker.set_fail_subscribe(true);
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;

    // Connected but unsubscribed is unhealthy; the attempt fails outright.
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(broker.connect_attempts(), 1);

    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(link.state(), LinkState::Disconnected);

    broker.set_fail_subscribe(false);
    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_is_retried_indefinitely_at_fixed_intervals() {
    let broker = MockBroker::new();
    broker.fail_next_connects(3);
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;
    assert_eq!(broker.connect_attempts(), 1);
    assert_eq!(link.state(), LinkState::Disconnected);

    for expected in 2..=3 {
        advance(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(broker.connect_attempts(), expected);
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 4);
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn publish_while_disconnected_connects_eagerly() {
    let broker = MockBroker::new();
    broker.fail_next_connects(1);
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(broker.connect_attempts(), 1);

    // No timer wait: the publish call itself drives the connect.
    link.publish(topics::DATA, b"payload".to_vec(), QosLevel::AtLeastOnce, true)
        .await
        .expect("publish after eager connect");

    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(broker.publishes_to(topics::DATA).len(), 1);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn publish_failure_propagates_and_cycles_the_session() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    broker.set_fail_publish(true);
    let err = link
        .publish(topics::DATA, b"payload".to_vec(), QosLevel::AtLeastOnce, true)
        .await
        .expect_err("publish should fail");
    assert!(err.is_connection_error());

    settle().await;
    assert_eq!(link.state(), LinkState::Disconnected);

    broker.set_fail_publish(false);
    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn malformed_inbound_payloads_are_dropped_without_dropping_the_session() {
    let broker = MockBroker::new();
    let (link, _task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;

    broker.inject_message(topics::SPEED, b"not-a-number").await;
    broker.inject_message(topics::DIRECTION, &[0xff, 0xfe]).await;
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    broker.inject_message(topics::SPEED, b"33.2").await;
    settle().await;
    assert_eq!(link.state(), LinkState::Connected);

    link.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_cleanly_and_stops_reconnecting() {
    let broker = MockBroker::new();
    let (link, task) = ConnectionManager::spawn(&test_config(), Box::new(broker.clone()));
    settle().await;

    link.shutdown().await.expect("shutdown");
    task.await.expect("supervisor exits");

    // A clean disconnect withdraws the last will broker-side.
    assert_eq!(broker.clean_disconnects(), 1);
    assert_eq!(link.state(), LinkState::Disconnected);

    advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(broker.connect_attempts(), 1);
}
