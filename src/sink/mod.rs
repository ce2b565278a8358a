//! Delivery sinks for generated readings.
//!
//! Each sink owns its resources outright (broker handle, store handle,
//! channel sender) and fails independently; the orchestrator in
//! `crate::monitor` logs a failed sink and carries on with the others.

pub mod archive;
pub mod broadcast;
pub mod publisher;

pub use archive::{Archiver, JsonlStore, ReadingStore};
pub use broadcast::Broadcaster;
pub use publisher::Publisher;
