//! Shared tally store service
//!
//! Holds the single poll record, serves reads and overwrites over HTTP and
//! pushes every change to WebSocket and SSE watchers.

pub mod http;
pub mod service;

pub use http::{create_router, PollState};
pub use service::PollServer;
