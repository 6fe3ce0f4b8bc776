//! Record store abstraction plus in-memory and SQLite backends.

/// Non-transactional in-memory backend.
pub mod memory;
/// SQLite backend.
pub mod sqlite;

use async_trait::async_trait;

use crate::{
    op::{CounterDelta, RecordOp, Transition},
    types::{CounterField, TargetId, VoterId},
    vote::{TargetCounters, VoteRecord},
};

/// Failure of a single store call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Insert hit an existing record for the key.
    #[error("vote by {voter} on {target} already exists")]
    Conflict {
        /// Record owner.
        voter: VoterId,
        /// Voted-on target.
        target: TargetId,
    },

    /// Delete found no record for the key.
    #[error("no vote by {voter} on {target}")]
    NotFound {
        /// Record owner.
        voter: VoterId,
        /// Voted-on target.
        target: TargetId,
    },

    /// The target row does not exist.
    #[error("unknown vote target {0}")]
    TargetNotFound(TargetId),

    /// SQLite backend failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Backend unreachable or its worker failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of [`RecordStore::adjust_counters`].
#[derive(Debug, thiserror::Error)]
#[error("counter write failed: {source}")]
pub struct CounterWriteError {
    /// Part of the delta that landed before the failure. Zero for backends
    /// that apply both fields together.
    pub applied: CounterDelta,
    /// Store failure.
    #[source]
    pub source: StoreError,
}

impl From<StoreError> for CounterWriteError {
    fn from(source: StoreError) -> Self {
        Self {
            applied: CounterDelta::default(),
            source,
        }
    }
}

/// Which stage of [`RecordStore::commit_transition`] failed.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The record write failed; nothing was committed.
    #[error("record write failed: {0}")]
    Record(#[source] StoreError),
    /// The record write committed but the counter write did not.
    #[error("counter write failed: {source}")]
    Counter {
        /// Record removed by the committed write, when it was a delete.
        removed: Option<VoteRecord>,
        /// Counter failure, including any partially applied delta.
        #[source]
        source: CounterWriteError,
    },
}

/// Durable storage for vote records and target counters.
///
/// Every method commits on its own. Backends that can do better override
/// [`RecordStore::commit_transition`] so the record and counter writes land
/// together, in which case every failure is reported as
/// [`CommitError::Record`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point read of one voter's record on one target.
    async fn find_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<Option<VoteRecord>>;

    /// Creates a record; [`StoreError::Conflict`] if the key is taken.
    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()>;

    /// Creates the record or replaces its polarity.
    async fn upsert_vote(&self, record: VoteRecord) -> StoreResult<()>;

    /// Removes a record and returns it; [`StoreError::NotFound`] if there is none.
    async fn delete_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<VoteRecord>;

    /// Applies a signed delta to one counter, clamping at zero. Returns the new value.
    async fn increment_counter(
        &self,
        target: TargetId,
        field: CounterField,
        delta: i64,
    ) -> StoreResult<u64>;

    /// Applies a delta to both counters in one write, clamping at zero.
    ///
    /// A backend that cannot update both fields together must report the
    /// part that landed in [`CounterWriteError::applied`].
    async fn adjust_counters(
        &self,
        target: TargetId,
        delta: CounterDelta,
    ) -> Result<(), CounterWriteError>;

    /// Current counters of a target.
    async fn read_counters(&self, target: TargetId) -> StoreResult<TargetCounters>;

    /// Dispatches one record write. Returns the removed record for a delete.
    async fn apply_record_op(
        &self,
        voter: VoterId,
        target: TargetId,
        op: RecordOp,
    ) -> StoreResult<Option<VoteRecord>> {
        match op {
            RecordOp::Insert(polarity) => self
                .insert_vote(VoteRecord::new(voter, target, polarity))
                .await
                .map(|()| None),
            RecordOp::Upsert(polarity) => self
                .upsert_vote(VoteRecord::new(voter, target, polarity))
                .await
                .map(|()| None),
            RecordOp::Delete => self.delete_vote(voter, target).await.map(Some),
        }
    }

    /// Writes the record, then the counters. The counter write is only
    /// attempted when the record write succeeded.
    async fn commit_transition(
        &self,
        voter: VoterId,
        target: TargetId,
        transition: &Transition,
    ) -> Result<(), CommitError> {
        let removed = self
            .apply_record_op(voter, target, transition.record)
            .await
            .map_err(CommitError::Record)?;
        if transition.delta.is_zero() {
            return Ok(());
        }
        self.adjust_counters(target, transition.delta)
            .await
            .map_err(|source| CommitError::Counter { removed, source })
    }
}
