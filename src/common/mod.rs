//! Common utilities and types shared across revealpoll

pub mod config;
pub mod error;
pub mod retry;
pub mod storage;
pub mod tally;
pub mod tracing_middleware;
pub mod utils;

pub use config::{ClientConfig, Config, RevealConfig, ServerConfig};
pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use storage::{KVStore, Storage, StorageKind};
pub use tally::{Tally, TallyEvent, VoteOption};
pub use utils::{join_path, websocket_url};
