#![forbid(unsafe_code)]

//! Decides when an incrementally rendered list has finished loading.
//!
//! The page never says "this is the end", so completeness is approximated: the
//! list is considered loaded once the item count stops growing for
//! [`ScrollPolicy::stable_rounds`] consecutive rounds. A page that pauses
//! rendering for longer than that window is truncated silently.

use std::time::Duration;

/// Named thresholds for the scroll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPolicy {
    /// Hard cap on scroll rounds.
    pub max_rounds: u32,
    /// Consecutive rounds without growth that count as converged.
    pub stable_rounds: u32,
    /// Every Nth round also tries the alternate scroll and a "show more" probe.
    pub probe_every: u32,
    /// Extra aggressive scrolls attempted once after hitting `max_rounds`.
    pub final_burst: u32,
    /// Wait after each scroll before counting.
    pub settle: Duration,
    /// Wait after the alternate scroll / probe.
    pub probe_settle: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            max_rounds: 100,
            stable_rounds: 10,
            probe_every: 5,
            final_burst: 5,
            settle: Duration::from_secs(3),
            probe_settle: Duration::from_secs(2),
        }
    }
}

impl ScrollPolicy {
    /// Same thresholds with no waiting; used by tests and fakes.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            probe_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller's item limit was reached.
    LimitReached,
    /// No growth for `stable_rounds` rounds.
    Converged,
    /// `max_rounds` was hit while the list was still changing.
    RoundCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    Growing,
    Stable { unchanged: u32 },
    Exhausted(StopReason),
}

/// What the scroll loop should do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue { probe: bool },
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct Convergence {
    policy: ScrollPolicy,
    limit: Option<usize>,
    rounds: u32,
    count: usize,
    state: ScrollState,
}

impl Convergence {
    pub fn new(policy: ScrollPolicy, limit: Option<usize>) -> Self {
        Self {
            policy,
            limit,
            rounds: 0,
            count: 0,
            state: ScrollState::Growing,
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    pub fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.count >= limit)
    }

    /// Feeds the item count seen after one scroll round.
    pub fn observe(&mut self, count: usize) -> Step {
        if let ScrollState::Exhausted(reason) = self.state {
            return Step::Stop(reason);
        }

        self.rounds += 1;
        let unchanged = match self.state {
            _ if count != self.count => 0,
            ScrollState::Stable { unchanged } => unchanged + 1,
            _ => 1,
        };
        self.count = count;
        self.state = if unchanged == 0 {
            ScrollState::Growing
        } else {
            ScrollState::Stable { unchanged }
        };

        let reason = if self.limit_reached() {
            Some(StopReason::LimitReached)
        } else if unchanged >= self.policy.stable_rounds {
            Some(StopReason::Converged)
        } else if self.rounds >= self.policy.max_rounds {
            Some(StopReason::RoundCap)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.state = ScrollState::Exhausted(reason);
                Step::Stop(reason)
            }
            None => Step::Continue {
                probe: self.policy.probe_every > 0 && self.rounds % self.policy.probe_every == 0,
            },
        }
    }

    /// Records a count seen during the post-cap burst without affecting the
    /// stop decision already taken.
    pub fn observe_burst(&mut self, count: usize) {
        self.count = self.count.max(count);
    }
}
