//! Configuration loading for the wind monitor.
//!
//! Configuration is loaded from a TOML file merged with environment variables
//! (prefixed with `WIND_MONITOR_`, nested keys separated by `__`). All options
//! except the broker endpoint carry defaults, so a minimal configuration is:
//!
//! ```toml
//! [broker]
//! url = "tcp://localhost:1883"
//! ```
//!
//! A blank or missing broker endpoint is fatal at startup; `validate` is
//! expected to run before any task is spawned.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Broker connection settings
    pub broker: BrokerConfig,
    /// Wind simulation settings
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Persistent store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker endpoint, e.g. `tcp://localhost:1883`. Required.
    pub url: String,
    /// Prefix for the generated client identifier
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Session handshake timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Delay between reconnect attempts in seconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

/// Wind simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds between generated readings
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Lower speed bound in km/h
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,
    /// Upper speed bound in km/h
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
}

/// Persistent store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Collection key readings are appended under
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Output directory for the append-only store
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Default value functions
fn default_app_name() -> String {
    "wind-monitor".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_client_id_prefix() -> String {
    "wind-sensor".to_string()
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    60
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_interval() -> u64 {
    5
}

fn default_min_speed() -> f64 {
    10.0
}

fn default_max_speed() -> f64 {
    50.0
}

fn default_collection() -> String {
    "wind_measurements".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            output_dir: default_output_dir(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the default location and environment variables.
    ///
    /// Environment variables override file values with the `WIND_MONITOR_`
    /// prefix, e.g. `WIND_MONITOR_BROKER__URL=tcp://broker:1883`.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config/wind-monitor.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("WIND_MONITOR_").split("__"))
            .extract()
    }

    /// Validate configuration after loading.
    ///
    /// Failures here are fatal at startup and never retried.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(format!(
                "invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.broker.url.trim().is_empty() {
            return Err("broker url must not be blank".to_string());
        }

        if self.broker.connection_timeout_secs == 0 {
            return Err("broker connection_timeout_secs must be at least 1".to_string());
        }

        if self.broker.reconnect_delay_secs == 0 {
            return Err("broker reconnect_delay_secs must be at least 1".to_string());
        }

        if self.simulation.interval_secs == 0 {
            return Err("simulation interval_secs must be at least 1".to_string());
        }

        if self.simulation.min_speed < 0.0 {
            return Err(format!(
                "simulation min_speed {} must not be negative",
                self.simulation.min_speed
            ));
        }

        if self.simulation.max_speed < self.simulation.min_speed {
            return Err(format!(
                "simulation max_speed {} is below min_speed {}",
                self.simulation.max_speed, self.simulation.min_speed
            ));
        }

        if self.storage.collection.trim().is_empty() {
            return Err("storage collection must not be blank".to_string());
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.simulation.interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.connection_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.broker.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.broker.reconnect_delay_secs)
    }
}
