//! Append-only, durable storage for the event log.
//!
//! The store is the durability boundary of the system: once `append_batch`
//! returns `Ok`, every event in the batch has been fsynced. The on-disk
//! format is line-delimited JSON, one [`EventEnvelope`](crate::codec::EventEnvelope)
//! per line, which is the compatibility surface for any other reader or
//! writer of the log.
//!
//! Two implementations are provided: [`FileEventStore`] for real deployments
//! and [`InMemoryEventStore`] for tests and prototyping.

use crate::codec::{self, CodecError};
use crate::event::WalletEvent;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors produced by event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O failure while writing, syncing, or reading the log.
    #[error("event store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be encoded for persistence, or a persisted line
    /// could not be decoded during replay.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The store was used after [`EventStore::close`].
    #[error("event store is closed")]
    Closed,
}

/// Contract for append-only event storage.
///
/// Implementations serialize concurrent appends through their own mutual
/// exclusion, so appends from multiple callers are totally ordered. In this
/// design the store is only ever called from the engine's single writer; the
/// internal lock makes that a guarantee rather than a convention.
pub trait EventStore {
    /// Persists a batch of events as a single atomic unit.
    ///
    /// Every event is serialized before any byte is written: a serialization
    /// failure anywhere in the batch writes nothing. On success all events
    /// in the batch are durable (fsynced) before this returns.
    fn append_batch(
        &self,
        events: &[WalletEvent],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persists a single event. Equivalent to a one-element batch.
    fn append(&self, event: &WalletEvent) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns every event previously appended, in append order.
    fn load_all(&self) -> impl Future<Output = Result<Vec<WalletEvent>, StoreError>> + Send;

    /// Releases the store's resources. Subsequent appends fail with
    /// [`StoreError::Closed`]; closing twice is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Durable event store over a line-delimited JSON file.
///
/// The file is opened for append with create-if-missing semantics and held
/// open until [`close`](EventStore::close); reads open an independent handle
/// so replay never disturbs the append position. Every batch is fsynced
/// before the append returns.
///
/// # Crash recovery
///
/// A crash mid-append can leave a partial final line. On open, a file that
/// does not end in a newline has its partial tail logged and truncated, so
/// the clean-terminated prefix is authoritative and the next append starts
/// on a line boundary. A structurally invalid *complete* line is corruption,
/// not a torn write, and fails [`load_all`](EventStore::load_all).
pub struct FileEventStore {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileEventStore {
    /// Opens (or creates) the event log at `path`, recovering from a torn
    /// final line if the previous process died mid-append.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        truncate_partial_tail(&path).await?;

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// The path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes all events from the store, truncating the backing file.
    ///
    /// Test support; a production log is append-only.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            return Err(StoreError::Closed);
        }

        // Drop the append handle before truncating, then reopen it.
        *guard = None;
        let truncated = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)
            .await?;
        truncated.sync_all().await?;
        drop(truncated);

        let file = OpenOptions::new().append(true).open(&self.path).await?;
        *guard = Some(file);
        Ok(())
    }
}

/// Drops a non-terminated final line left behind by a crash mid-append.
async fn truncate_partial_tail(path: &Path) -> Result<(), StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error.into()),
    };

    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes
        .iter()
        .rposition(|&byte| byte == b'\n')
        .map_or(0, |index| index as u64 + 1);
    tracing::warn!(
        path = %path.display(),
        discarded_bytes = bytes.len() as u64 - keep,
        "event log ends in a partial line, truncating to the last clean boundary"
    );

    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep).await?;
    file.sync_all().await?;
    Ok(())
}

impl EventStore for FileEventStore {
    async fn append_batch(&self, events: &[WalletEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        // Serialize the whole batch up front: a codec failure on any event
        // must write zero bytes for the batch.
        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&codec::encode(event)?);
            buffer.push('\n');
        }

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(StoreError::Closed)?;
        file.write_all(buffer.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn append(&self, event: &WalletEvent) -> Result<(), StoreError> {
        self.append_batch(std::slice::from_ref(event)).await
    }

    async fn load_all(&self) -> Result<Vec<WalletEvent>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let clean_end = content.ends_with('\n');
        let lines: Vec<&str> = content.split('\n').collect();
        let last = lines.len().saturating_sub(1);

        let mut events = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            if !clean_end && index == last {
                // Written by another handle after open; end of log.
                tracing::warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    "event log ends in a partial line, treating it as end of log"
                );
                break;
            }
            let event = codec::decode(line).map_err(|error| {
                tracing::error!(
                    path = %self.path.display(),
                    line = index + 1,
                    %error,
                    "invalid event line during replay"
                );
                error
            })?;
            events.push(event);
        }

        Ok(events)
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.take() {
            file.sync_all().await?;
        }
        Ok(())
    }
}

/// In-memory event store for tests and prototyping.
///
/// Implements the same contract as [`FileEventStore`] over a `Vec`, including
/// the all-or-nothing batch semantics (events are encoded before any is
/// stored) and the closed-store failure mode. As with the file store, reads
/// keep working after close; only appends are refused. Nothing survives the
/// process.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<WalletEvent>>,
    closed: AtomicBool,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    async fn append_batch(&self, events: &[WalletEvent]) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        // Mirror the file store's atomicity: validate the whole batch first.
        for event in events {
            codec::encode(event)?;
        }

        self.events.lock().await.extend(events.iter().cloned());
        Ok(())
    }

    async fn append(&self, event: &WalletEvent) -> Result<(), StoreError> {
        self.append_batch(std::slice::from_ref(event)).await
    }

    async fn load_all(&self) -> Result<Vec<WalletEvent>, StoreError> {
        Ok(self.events.lock().await.clone())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Blanket implementation so both owned and borrowed stores work: the trait
/// only needs `&self`, and forcing consumers to clone or move a store would
/// be gratuitous.
impl<T: EventStore + Sync> EventStore for &T {
    async fn append_batch(&self, events: &[WalletEvent]) -> Result<(), StoreError> {
        (*self).append_batch(events).await
    }

    async fn append(&self, event: &WalletEvent) -> Result<(), StoreError> {
        (*self).append(event).await
    }

    async fn load_all(&self) -> Result<Vec<WalletEvent>, StoreError> {
        (*self).load_all().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (*self).close().await
    }
}

/// `Arc`-wrapped stores also satisfy the contract, so a store can be shared
/// between the engine's writer and an out-of-band inspector (tests, tooling).
impl<T: EventStore + Send + Sync> EventStore for std::sync::Arc<T> {
    async fn append_batch(&self, events: &[WalletEvent]) -> Result<(), StoreError> {
        (**self).append_batch(events).await
    }

    async fn append(&self, event: &WalletEvent) -> Result<(), StoreError> {
        (**self).append(event).await
    }

    async fn load_all(&self) -> Result<Vec<WalletEvent>, StoreError> {
        (**self).load_all().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }
}
