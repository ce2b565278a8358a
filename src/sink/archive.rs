//! Persistent store sink.
//!
//! The store itself sits behind the [`ReadingStore`] trait; the default
//! implementation appends JSON lines to `<collection>.jsonl` in the
//! configured output directory, generating one key per record the way a
//! hosted document store would.

use crate::config::StorageConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::reading::WindReading;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, error};

/// Append-only persistence boundary.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Prepare the store for appends. Called at most once per run.
    async fn init(&self) -> MonitorResult<()>;

    /// Append one reading under the collection key, returning the
    /// store-generated record key.
    async fn append(&self, collection: &str, reading: &WindReading) -> MonitorResult<String>;
}

/// Archives readings to the persistent store, independently of broker
/// health.
///
/// The store is initialized lazily on the first append. Initialization runs
/// exactly once even under concurrent ticks; if it fails, archiving is
/// disabled for the rest of the run while the other sinks keep working.
pub struct Archiver {
    store: Box<dyn ReadingStore>,
    collection: String,
    ready: OnceCell<()>,
    disabled: AtomicBool,
}

impl Archiver {
    pub fn new(store: Box<dyn ReadingStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            ready: OnceCell::new(),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub async fn archive(&self, reading: &WindReading) -> MonitorResult<String> {
        if self.is_disabled() {
            return Err(MonitorError::StoreDisabled);
        }

        if let Err(err) = self.ready.get_or_try_init(|| self.store.init()).await {
            self.disabled.store(true, Ordering::SeqCst);
            error!(error = %err, "store initialization failed, archiving disabled for this run");
            return Err(MonitorError::StoreDisabled);
        }

        let key = self.store.append(&self.collection, reading).await?;
        debug!(%key, "reading archived");
        Ok(key)
    }
}

#[derive(Serialize)]
struct StoredReading<'a> {
    key: &'a str,
    #[serde(flatten)]
    reading: &'a WindReading,
}

/// Default store: one JSON line per reading in `<collection>.jsonl`.
pub struct JsonlStore {
    output_dir: PathBuf,
}

impl JsonlStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
        }
    }
}

#[async_trait]
impl ReadingStore for JsonlStore {
    async fn init(&self) -> MonitorResult<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| {
                MonitorError::Store(format!(
                    "failed to create store directory '{}': {}",
                    self.output_dir.display(),
                    err
                ))
            })
    }

    async fn append(&self, collection: &str, reading: &WindReading) -> MonitorResult<String> {
        let key = uuid::Uuid::new_v4().to_string();
        let record = StoredReading {
            key: &key,
            reading,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let path = self.output_dir.join(format!("{}.jsonl", collection));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| {
                MonitorError::Store(format!("failed to open '{}': {}", path.display(), err))
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| MonitorError::Store(format!("append failed: {}", err)))?;
        file.flush()
            .await
            .map_err(|err| MonitorError::Store(format!("append failed: {}", err)))?;

        Ok(key)
    }
}
