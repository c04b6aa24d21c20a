//! Persistence backend adapter
//!
//! Three primitives with the same meaning whichever store is behind them:
//! - `read`: the stored tally, or `None` when the store has never been
//!   initialized
//! - `write`: overwrite the whole tally (no atomic increment)
//! - `subscribe`: callback on every stored change, including our own writes
//!
//! `LocalBackend` keeps the tally in client-local storage and cannot notify
//! anyone. `SharedBackend` is the source of truth held by the server.
//! `RemoteBackend` talks to a `SharedBackend` over HTTP and WebSocket.

pub mod local;
pub mod remote;
pub mod shared;

pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use shared::SharedBackend;

use crate::common::{Result, Tally};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Fixed key of the single tally record
pub const TALLY_KEY: &str = "tally";

/// Which kind of store a backend talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Remote,
    LocalFallback,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Remote => write!(f, "remote"),
            BackendMode::LocalFallback => write!(f, "local-fallback"),
        }
    }
}

/// Change listener handed to `Backend::subscribe`
pub type TallyCallback = Arc<dyn Fn(Tally) + Send + Sync>;

#[async_trait]
pub trait Backend: Send + Sync {
    fn mode(&self) -> BackendMode;

    /// Current stored tally; `Ok(None)` means the store needs initialization.
    async fn read(&self) -> Result<Option<Tally>>;

    /// Replace the stored tally.
    async fn write(&self, tally: Tally) -> Result<()>;

    /// Deliver every stored change to `on_change` until the returned handle
    /// is dropped. Callers must tolerate seeing their own writes echoed back.
    fn subscribe(&self, on_change: TallyCallback) -> Result<Subscription>;
}

/// Handle for a live subscription. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// A subscription that never delivers anything
    pub fn noop() -> Self {
        Self { task: None }
    }

    pub(crate) fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Whether change delivery is still running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
