//! Runtime event stream payloads.

use crate::{
    types::{Polarity, TargetId, VoterId},
    vote::TargetCounters,
};

/// Events emitted from the ledger runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteEvent {
    /// A cast committed.
    Cast {
        /// Acting voter.
        voter: VoterId,
        /// Voted-on target.
        target: TargetId,
        /// Vote before the cast.
        from: Option<Polarity>,
        /// Vote after the cast.
        to: Option<Polarity>,
        /// Counters shown after the cast.
        counters: TargetCounters,
    },
    /// A record write landed but its counter write did not.
    CounterDrift {
        /// Acting voter.
        voter: VoterId,
        /// Affected target.
        target: TargetId,
        /// True when the record write was reverted.
        compensated: bool,
    },
}
