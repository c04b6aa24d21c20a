//! Vote coordinator
//!
//! The coordinator is responsible for:
//! - Owning the cached tally and the session state machine
//! - The read-modify-write increment protocol against the active backend
//! - The per-client "already voted" gate
//! - Republishing tally changes to presentation listeners

pub mod flag;
pub mod listeners;
pub mod state;
pub mod vote;

pub use flag::VoteFlag;
pub use listeners::{ListenerHandle, ListenerRegistry, PollEvent};
pub use state::SessionState;
pub use vote::{RejectReason, SubmitOutcome, VoteCoordinator};
