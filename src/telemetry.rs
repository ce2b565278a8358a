//! Tracing bootstrap.
//!
//! Structured, async-aware logging built on `tracing` and
//! `tracing-subscriber`. The level comes from the application configuration
//! unless `RUST_LOG` is set, in which case the environment filter wins.
//! Initialization is idempotent so the binary and tests can both call it.

use crate::config::MonitorConfig;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize tracing from the service configuration.
pub fn init_from_config(config: &MonitorConfig) -> Result<(), String> {
    let level = parse_log_level(&config.application.log_level)?;
    init(level)
}

/// Initialize tracing with an explicit level.
///
/// Returns Ok when a global subscriber is already installed, which is the
/// expected situation in tests.
pub fn init(level: Level) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .or_else(|e| {
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("failed to initialize tracing: {}", e))
            }
        })
}

/// Parse a log level string into a tracing `Level`.
fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}
