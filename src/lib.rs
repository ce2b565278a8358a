//! # Wind Monitor Core Library
//!
//! This crate implements a connection-resilient wind telemetry service: a
//! periodic scheduler samples a synthetic wind sensor and distributes each
//! reading to three independent sinks with isolated failure domains.
//!
//! ## Crate Structure
//!
//! - **`broker`**: The broker boundary. Connector and transport traits, the
//!   fixed topic table, and the production rumqttc adapter.
//! - **`config`**: Strongly-typed configuration loaded from TOML and
//!   environment variables, validated before anything starts.
//! - **`error`**: The `MonitorError` enum for centralized error handling.
//! - **`link`**: The connection supervisor. Owns the broker session, restores
//!   subscriptions after every reconnect, and paces retry attempts on a
//!   single-slot timer.
//! - **`monitor`**: The scheduler and fan-out orchestrator, plus the service
//!   handle exposing the manual trigger, status probe, and push-channel
//!   subscriptions.
//! - **`reading`**: The immutable `WindReading` value object and its bounded
//!   generator.
//! - **`sink`**: The three delivery sinks: broker publisher, persistent
//!   archiver, and push-channel broadcaster.
//! - **`telemetry`**: Tracing bootstrap.

pub mod broker;
pub mod config;
pub mod error;
pub mod link;
pub mod monitor;
pub mod reading;
pub mod sink;
pub mod telemetry;

pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use link::{LinkHandle, LinkState};
pub use monitor::{MonitorHandle, WindMonitor, PUBLISH_SUCCESS, STATUS_OPERATIONAL};
pub use reading::WindReading;
