//! Push-channel sink.

use crate::reading::WindReading;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// Fans readings out to live subscribers.
///
/// Built on a broadcast channel: zero subscribers is a no-op success, and a
/// lagging subscriber only loses its own backlog, never anyone else's
/// delivery.
#[derive(Clone)]
pub struct Broadcaster {
    channel: broadcast::Sender<WindReading>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { channel }
    }

    /// Attach a live subscriber. Receives every reading broadcast after this
    /// call.
    pub fn subscribe(&self) -> broadcast::Receiver<WindReading> {
        self.channel.subscribe()
    }

    /// Push a reading to all current subscribers, returning how many
    /// received it.
    pub fn broadcast(&self, reading: &WindReading) -> usize {
        match self.channel.send(*reading) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("no live subscribers for reading");
                0
            }
        }
    }

    /// Request/response echo: re-stamp a submitted sample, broadcast it, and
    /// hand it back to the requester.
    pub fn submit(&self, speed: f64, direction: f64) -> WindReading {
        let reading = WindReading::now(speed, direction);
        self.broadcast(&reading);
        reading
    }
}
