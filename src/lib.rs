//! # revealpoll
//!
//! A two-option reveal poll with a shared live tally:
//! - One vote per client, gated by a locally persisted flag
//! - Read-modify-write increments against a shared store
//! - Live push of every change to all connected clients
//! - Local fallback when the shared store is unreachable
//! - A scripted countdown that ends in the reveal
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────┐
//! │   revealpoll-server            │
//! │   one tally record             │
//! │   GET/PUT /tally, watch ws/sse │
//! └───────────┬───────────────────┘
//!             │ HTTP + WebSocket
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼───────────┐  ┌─────▼───────┐  ┌───▼─────────┐
//! │ Client 1     │  │ Client 2     │  │ Client 3     │
//! │ Coordinator  │  │ Coordinator  │  │ Coordinator  │
//! │ + local file │  │ + local file │  │ (degraded)   │
//! └──────────────┘  └──────────────┘  └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the shared store
//! ```bash
//! revealpoll-server serve --bind 0.0.0.0:8080 --storage file --data ./poll/tally.json
//! ```
//!
//! ### Vote and watch
//! ```bash
//! revealpoll --server http://localhost:8080 vote a
//! revealpoll --server http://localhost:8080 watch
//! revealpoll --server http://localhost:8080 reveal
//! ```

pub mod backend;
pub mod common;
pub mod coordinator;
pub mod reveal;
pub mod server;

// Re-export commonly used types
pub use backend::{Backend, BackendMode};
pub use common::{Config, Error, Result, Tally, VoteOption};
pub use coordinator::{PollEvent, SubmitOutcome, VoteCoordinator};
pub use server::PollServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
