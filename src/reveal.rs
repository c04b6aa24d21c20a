//! Scripted reveal: step sequencing and the final countdown

use crate::common::{RevealConfig, Tally, VoteOption};
use std::time::Duration;

/// Screens of the poll, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Cast a vote and watch the live tally
    Vote,
    /// Show the option this client picked
    Choice,
    /// Count down, then reveal
    Countdown,
}

impl Step {
    /// Next step, if the current one may be left. Leaving `Vote` needs at
    /// least one vote in the tally.
    pub fn next(self, tally: &Tally) -> Option<Step> {
        match self {
            Step::Vote if tally.has_votes() => Some(Step::Choice),
            Step::Vote => None,
            Step::Choice => Some(Step::Countdown),
            Step::Countdown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    pub result: VoteOption,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent {
    /// Seconds left; the last tick is 0
    Tick(u64),
    Revealed(Reveal),
}

pub struct Countdown {
    seconds: u64,
    reveal: Reveal,
}

impl Countdown {
    pub fn new(seconds: u64, reveal: Reveal) -> Self {
        Self { seconds, reveal }
    }

    pub fn from_config(config: &RevealConfig) -> Self {
        Self::new(
            config.countdown_secs,
            Reveal {
                result: config.result,
                name: config.name.clone(),
            },
        )
    }

    /// Emit `Tick(n) .. Tick(0)` one second apart, then `Revealed`.
    pub async fn run(&self, mut on_event: impl FnMut(CountdownEvent)) -> Reveal {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        for remaining in (0..=self.seconds).rev() {
            interval.tick().await;
            on_event(CountdownEvent::Tick(remaining));
        }
        on_event(CountdownEvent::Revealed(self.reveal.clone()));
        self.reveal.clone()
    }
}
