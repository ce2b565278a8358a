//! Broker sink.

use crate::broker::{topics, QosLevel};
use crate::error::MonitorResult;
use crate::link::LinkHandle;
use crate::reading::WindReading;

/// Publishes readings on the combined data topic.
///
/// Messages go out at-least-once and retained, so a subscriber attaching
/// later immediately receives the last known reading.
#[derive(Clone)]
pub struct Publisher {
    link: LinkHandle,
}

impl Publisher {
    pub fn new(link: LinkHandle) -> Self {
        Self { link }
    }

    pub async fn publish(&self, reading: &WindReading) -> MonitorResult<()> {
        let payload = reading.wire_payload().into_bytes();
        self.link
            .publish(topics::DATA, payload, QosLevel::AtLeastOnce, true)
            .await
    }
}
