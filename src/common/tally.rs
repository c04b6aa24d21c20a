//! Poll data model: the two options and their counters

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two poll options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOption {
    A,
    B,
}

impl VoteOption {
    pub const ALL: [VoteOption; 2] = [VoteOption::A, VoteOption::B];

    /// Stable lowercase key used in persisted state
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOption::A => "a",
            VoteOption::B => "b",
        }
    }
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOption::A => write!(f, "A"),
            VoteOption::B => write!(f, "B"),
        }
    }
}

impl FromStr for VoteOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(VoteOption::A),
            "b" => Ok(VoteOption::B),
            other => Err(Error::InvalidOption(other.to_string())),
        }
    }
}

/// The pair of vote counters.
///
/// Counters only ever grow during the life of a poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub option_a: u64,
    pub option_b: u64,
}

impl Tally {
    pub fn new(option_a: u64, option_b: u64) -> Self {
        Self { option_a, option_b }
    }

    pub fn count(&self, option: VoteOption) -> u64 {
        match option {
            VoteOption::A => self.option_a,
            VoteOption::B => self.option_b,
        }
    }

    /// Copy of this tally with one more vote for `option`
    pub fn incremented(&self, option: VoteOption) -> Self {
        let mut next = *self;
        match option {
            VoteOption::A => next.option_a = next.option_a.saturating_add(1),
            VoteOption::B => next.option_b = next.option_b.saturating_add(1),
        }
        next
    }

    pub fn total(&self) -> u64 {
        self.option_a.saturating_add(self.option_b)
    }

    pub fn has_votes(&self) -> bool {
        self.total() > 0
    }

    /// True when no counter of `other` is ahead of ours.
    pub fn covers(&self, other: &Tally) -> bool {
        self.option_a >= other.option_a && self.option_b >= other.option_b
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A={} B={}", self.option_a, self.option_b)
    }
}

/// Change notification pushed by the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEvent {
    pub tally: Tally,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl TallyEvent {
    pub fn now(tally: Tally) -> Self {
        Self {
            tally,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
