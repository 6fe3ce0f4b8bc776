//! Vote operation errors.

use crate::{
    persist::StoreError,
    types::{TargetId, VoterId},
};

/// Failure of a ledger operation.
#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    /// No identity was resolved; nothing was read or written.
    #[error("voting requires a signed-in user")]
    Unauthenticated,

    /// Requested polarity outside {+1, -1}; never reaches storage.
    #[error("invalid vote polarity {0}, expected 1 or -1")]
    InvalidPolarity(i64),

    /// A previous cast on the same view has not resolved yet.
    #[error("a vote on {target} is already in flight")]
    VoteInFlight {
        /// Target of the pending cast.
        target: TargetId,
    },

    /// Record write failed; counters untouched and the view rolled back.
    #[error("vote write failed for {target}")]
    VoteWriteFailed {
        /// Voted-on target.
        target: TargetId,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// Record write succeeded but the counter write failed, so the record and
    /// the target counters disagree unless `compensated` is true.
    #[error("counter update failed for {target} after vote by {voter} (compensated: {compensated})")]
    CounterUpdateFailed {
        /// Voted-on target.
        target: TargetId,
        /// Voter whose record was written.
        voter: VoterId,
        /// True when the record write and any partially applied counter
        /// change were both reverted.
        compensated: bool,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// Loading counters or the viewer's record failed.
    #[error("failed to read vote state for {target}")]
    ReadFailed {
        /// Target being read.
        target: TargetId,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

impl VoteError {
    /// True when the record and counters may now disagree.
    pub fn is_drift(&self) -> bool {
        matches!(
            self,
            Self::CounterUpdateFailed {
                compensated: false,
                ..
            }
        )
    }
}
