//! Client-local fallback store

use super::{Backend, BackendMode, Subscription, TallyCallback, TALLY_KEY};
use crate::common::{Result, Storage, Tally};
use async_trait::async_trait;

/// Tally kept in durable client-local storage.
///
/// No other client can see these writes, so `subscribe` never fires.
#[derive(Clone)]
pub struct LocalBackend {
    storage: Storage,
}

impl LocalBackend {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> Result<Option<Tally>> {
        self.storage.get_json(TALLY_KEY)
    }

    pub fn store(&self, tally: &Tally) -> Result<()> {
        self.storage.put_json(TALLY_KEY, tally)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::LocalFallback
    }

    async fn read(&self) -> Result<Option<Tally>> {
        self.load()
    }

    async fn write(&self, tally: Tally) -> Result<()> {
        self.store(&tally)
    }

    fn subscribe(&self, _on_change: TallyCallback) -> Result<Subscription> {
        Ok(Subscription::noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_write_then_read() {
        let backend = LocalBackend::new(Storage::new_memory());
        assert_eq!(backend.read().await.unwrap(), None);

        backend.write(Tally::new(2, 5)).await.unwrap();
        assert_eq!(backend.read().await.unwrap(), Some(Tally::new(2, 5)));
    }

    #[tokio::test]
    async fn test_subscribe_is_noop() {
        let backend = LocalBackend::new(Storage::new_memory());
        let sub = backend.subscribe(Arc::new(|_| {})).unwrap();
        assert!(!sub.is_active());
        assert_eq!(backend.mode(), BackendMode::LocalFallback);
    }
}
