//! Per-session coordinator state

use crate::backend::BackendMode;
use crate::common::Tally;

/// `Synced` and `Degraded` are the only steady states; there is no terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    /// Backed by the shared store
    Synced(Tally),
    /// Backed by client-local storage only
    Degraded(Tally),
}

impl SessionState {
    pub fn tally(&self) -> Option<Tally> {
        match self {
            SessionState::Uninitialized => None,
            SessionState::Synced(t) | SessionState::Degraded(t) => Some(*t),
        }
    }

    pub fn mode(&self) -> Option<BackendMode> {
        match self {
            SessionState::Uninitialized => None,
            SessionState::Synced(_) => Some(BackendMode::Remote),
            SessionState::Degraded(_) => Some(BackendMode::LocalFallback),
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self, SessionState::Uninitialized)
    }

    /// Same variant, new cached tally
    pub fn with_tally(self, tally: Tally) -> Self {
        match self {
            SessionState::Uninitialized => SessionState::Uninitialized,
            SessionState::Synced(_) => SessionState::Synced(tally),
            SessionState::Degraded(_) => SessionState::Degraded(tally),
        }
    }
}
