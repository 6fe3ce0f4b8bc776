//! Vote records, target counters, and the per-viewer vote view.

use serde::{Deserialize, Serialize};

use crate::{
    op::{CounterDelta, Transition},
    types::{now_ms, CounterField, Polarity, TargetId, VoterId},
};

/// One voter's vote on one target. At most one exists per (voter, target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Owning voter.
    pub voter_id: VoterId,
    /// Voted-on thread or comment.
    pub target: TargetId,
    /// +1 or -1.
    pub polarity: Polarity,
    /// Creation timestamp in milliseconds since epoch.
    pub created_at_ms: u64,
}

impl VoteRecord {
    /// Builds a record stamped with the current time.
    pub fn new(voter_id: VoterId, target: TargetId, polarity: Polarity) -> Self {
        Self {
            voter_id,
            target,
            polarity,
            created_at_ms: now_ms(),
        }
    }
}

/// Denormalized vote tallies stored on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetCounters {
    /// Number of +1 votes.
    pub upvotes: u64,
    /// Number of -1 votes.
    pub downvotes: u64,
}

impl TargetCounters {
    /// Builds counters from explicit tallies.
    pub fn new(upvotes: u64, downvotes: u64) -> Self {
        Self { upvotes, downvotes }
    }

    /// `upvotes - downvotes`, never stored.
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }

    /// Reads one counter.
    pub fn get(&self, field: CounterField) -> u64 {
        match field {
            CounterField::Upvotes => self.upvotes,
            CounterField::Downvotes => self.downvotes,
        }
    }

    /// Returns the counters after `delta`, each clamped at zero.
    pub fn with_delta(self, delta: CounterDelta) -> Self {
        Self {
            upvotes: clamped_add(self.upvotes, delta.upvotes),
            downvotes: clamped_add(self.downvotes, delta.downvotes),
        }
    }
}

pub(crate) fn clamped_add(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

/// What one viewer currently sees for one target.
///
/// Populated by [`crate::core::ledger::VoteLedger::open_view`] and discarded
/// when the viewer navigates away. `current_vote` drives button highlighting
/// and the next transition without a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteView {
    /// Target being displayed.
    pub target: TargetId,
    /// Voter whose record `current_vote` reflects, if any.
    pub viewer: Option<VoterId>,
    /// Last known counters, including optimistic updates.
    pub counters: TargetCounters,
    /// Viewer's vote on this target.
    pub current_vote: Option<Polarity>,
    pending: bool,
}

impl VoteView {
    /// Builds a settled view.
    pub fn new(
        target: TargetId,
        viewer: Option<VoterId>,
        counters: TargetCounters,
        current_vote: Option<Polarity>,
    ) -> Self {
        Self {
            target,
            viewer,
            counters,
            current_vote,
            pending: false,
        }
    }

    /// Displayed score.
    pub fn score(&self) -> i64 {
        self.counters.score()
    }

    /// True while a cast is awaiting the store.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn begin(&mut self, transition: &Transition) {
        self.counters = self.counters.with_delta(transition.delta);
        self.current_vote = transition.to;
        self.pending = true;
    }

    pub(crate) fn settle(&mut self) {
        self.pending = false;
    }
}
