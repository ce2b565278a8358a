//! Wind reading value object and synthetic generator.
//!
//! A `WindReading` is one immutable sample of speed, direction, and capture
//! time. Readings are created once per scheduler tick (or per manual trigger)
//! and handed read-only to every sink; no component mutates a reading after
//! construction.

use crate::error::{MonitorError, MonitorResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One immutable wind sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    /// Wind speed in km/h.
    pub speed: f64,
    /// Wind direction in degrees, within `[0, 360)`.
    pub direction: f64,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl WindReading {
    /// Build a reading stamped with the current wall clock.
    pub fn now(speed: f64, direction: f64) -> Self {
        Self {
            speed,
            direction,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Render the compact broker payload with fixed numeric precision.
    pub fn wire_payload(&self) -> String {
        format!(
            r#"{{"speed":{:.2},"direction":{:.2},"timestamp":{}}}"#,
            self.speed, self.direction, self.timestamp
        )
    }
}

/// Parse a raw metric payload from a subscribed topic.
///
/// Inbound metrics are plain decimal numbers. Anything else is a
/// `MalformedPayload` error; callers drop the message and keep the session.
pub fn parse_metric(topic: &str, payload: &[u8]) -> MonitorResult<f64> {
    let text = std::str::from_utf8(payload).map_err(|_| MonitorError::MalformedPayload {
        topic: topic.to_string(),
        payload: String::from_utf8_lossy(payload).into_owned(),
    })?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| MonitorError::MalformedPayload {
            topic: topic.to_string(),
            payload: text.to_string(),
        })
}

/// Produces synthetic readings within configured bounds.
///
/// Timestamps are strictly increasing: the wall clock can land on the same
/// millisecond twice between close samples, in which case the later sample is
/// bumped by one.
#[derive(Debug)]
pub struct ReadingGenerator {
    min_speed: f64,
    max_speed: f64,
    last_timestamp: i64,
}

impl ReadingGenerator {
    pub fn new(min_speed: f64, max_speed: f64) -> Self {
        Self {
            min_speed,
            max_speed,
            last_timestamp: 0,
        }
    }

    /// Generate the next reading.
    pub fn next_reading(&mut self) -> WindReading {
        let mut rng = rand::thread_rng();
        let speed = rng.gen_range(self.min_speed..=self.max_speed);
        let direction = rng.gen_range(0.0..360.0);

        let mut timestamp = chrono::Utc::now().timestamp_millis();
        if timestamp <= self.last_timestamp {
            timestamp = self.last_timestamp + 1;
        }
        self.last_timestamp = timestamp;

        WindReading {
            speed,
            direction,
            timestamp,
        }
    }
}
