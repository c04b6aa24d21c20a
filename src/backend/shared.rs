//! Source-of-truth tally store with change fan-out
//!
//! The server wraps one of these. It can also be shared in-process between
//! several coordinators, which then behave exactly like clients of a remote
//! store.

use super::{Backend, BackendMode, Subscription, TallyCallback, TALLY_KEY};
use crate::common::{Error, Result, Storage, Tally, TallyEvent};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub struct SharedBackend {
    storage: Storage,
    /// Serializes read-check-write sequences on the record
    write_lock: Mutex<()>,
    events: broadcast::Sender<TallyEvent>,
}

impl SharedBackend {
    pub fn new(storage: Storage, capacity: usize) -> Self {
        let (events, _rx) = broadcast::channel(capacity.max(1));
        Self {
            storage,
            write_lock: Mutex::new(()),
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Storage::new_memory(), 100)
    }

    pub fn current(&self) -> Result<Option<Tally>> {
        self.storage.get_json(TALLY_KEY)
    }

    /// Receiver for every change written from now on
    pub fn watch(&self) -> broadcast::Receiver<TallyEvent> {
        self.events.subscribe()
    }

    /// Number of live watchers (server sockets and in-process subscribers)
    pub fn watcher_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Overwrite unconditionally and notify watchers.
    pub fn put(&self, tally: Tally) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Storage("write lock poisoned".into()))?;
        self.persist_and_notify(tally)
    }

    /// Overwrite unless the new tally would decrement a stored counter.
    pub fn put_monotonic(&self, tally: Tally) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Storage("write lock poisoned".into()))?;
        if let Some(current) = self.current()? {
            if !tally.covers(&current) {
                return Err(Error::BackendWriteRejected(format!(
                    "{} would decrement stored {}",
                    tally, current
                )));
            }
        }
        self.persist_and_notify(tally)
    }

    fn persist_and_notify(&self, tally: Tally) -> Result<()> {
        self.storage.put_json(TALLY_KEY, &tally)?;
        // No receivers is fine: nobody is watching yet.
        let delivered = self.events.send(TallyEvent::now(tally)).unwrap_or(0);
        debug!(tally = %tally, watchers = delivered, "tally stored");
        Ok(())
    }
}

#[async_trait]
impl Backend for SharedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn read(&self) -> Result<Option<Tally>> {
        self.current()
    }

    async fn write(&self, tally: Tally) -> Result<()> {
        self.put(tally)
    }

    fn subscribe(&self, on_change: TallyCallback) -> Result<Subscription> {
        let mut rx = self.watch();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => on_change(event.tally),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber lagged behind tally changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::from_task(task))
    }
}
