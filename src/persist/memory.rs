//! In-process record store without cross-call atomicity.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use hashbrown::HashMap;

use crate::{
    op::CounterDelta,
    types::{CounterField, TargetId, VoterId},
    vote::{clamped_add, TargetCounters, VoteRecord},
};

use super::{CounterWriteError, RecordStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    votes: HashMap<(VoterId, TargetId), VoteRecord>,
    targets: HashMap<TargetId, TargetCounters>,
}

/// `HashMap`-backed [`RecordStore`].
///
/// Each call takes the lock once, so the record write and the counter write
/// of a transition commit independently, like a remote row store would.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl InMemoryRecordStore {
    /// Empty store with no targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InMemoryRecordStore::put_target`].
    pub fn with_target(mut self, target: TargetId, counters: TargetCounters) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.targets.insert(target, counters);
        }
        self
    }

    /// Creates or overwrites a target's counters.
    pub fn put_target(&self, target: TargetId, counters: TargetCounters) -> StoreResult<()> {
        self.lock()?.targets.insert(target, counters);
        Ok(())
    }

    /// Number of vote records across all targets.
    pub fn vote_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.votes.len())
    }

    /// All records on one target.
    pub fn votes_for(&self, target: TargetId) -> StoreResult<Vec<VoteRecord>> {
        Ok(self
            .lock()?
            .votes
            .values()
            .filter(|r| r.target == target)
            .cloned()
            .collect())
    }

    /// Rewrites a target's counters from its records. Returns `(before, after)`.
    pub fn recount(&self, target: TargetId) -> StoreResult<(TargetCounters, TargetCounters)> {
        let mut state = self.lock()?;
        let before = *state
            .targets
            .get(&target)
            .ok_or(StoreError::TargetNotFound(target))?;
        let after = tally(state.votes.values().filter(|r| r.target == target));
        state.targets.insert(target, after);
        if before != after {
            tracing::info!(%target, ?before, ?after, "recounted drifted target");
        }
        Ok((before, after))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn tally<'a>(records: impl Iterator<Item = &'a VoteRecord>) -> TargetCounters {
    records.fold(TargetCounters::default(), |mut acc, r| {
        match r.polarity.counter_field() {
            CounterField::Upvotes => acc.upvotes += 1,
            CounterField::Downvotes => acc.downvotes += 1,
        }
        acc
    })
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<Option<VoteRecord>> {
        Ok(self.lock()?.votes.get(&(voter, target)).cloned())
    }

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        let mut state = self.lock()?;
        let key = (record.voter_id, record.target);
        if state.votes.contains_key(&key) {
            return Err(StoreError::Conflict {
                voter: record.voter_id,
                target: record.target,
            });
        }
        state.votes.insert(key, record);
        Ok(())
    }

    async fn upsert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .votes
            .entry((record.voter_id, record.target))
            .and_modify(|existing| existing.polarity = record.polarity)
            .or_insert(record);
        Ok(())
    }

    async fn delete_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<VoteRecord> {
        self.lock()?
            .votes
            .remove(&(voter, target))
            .ok_or(StoreError::NotFound { voter, target })
    }

    async fn increment_counter(
        &self,
        target: TargetId,
        field: CounterField,
        delta: i64,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let counters = state
            .targets
            .get_mut(&target)
            .ok_or(StoreError::TargetNotFound(target))?;
        let slot = match field {
            CounterField::Upvotes => &mut counters.upvotes,
            CounterField::Downvotes => &mut counters.downvotes,
        };
        *slot = clamped_add(*slot, delta);
        Ok(*slot)
    }

    async fn adjust_counters(
        &self,
        target: TargetId,
        delta: CounterDelta,
    ) -> Result<(), CounterWriteError> {
        let mut state = self.lock()?;
        let counters = state
            .targets
            .get_mut(&target)
            .ok_or(StoreError::TargetNotFound(target))?;
        *counters = counters.with_delta(delta);
        Ok(())
    }

    async fn read_counters(&self, target: TargetId) -> StoreResult<TargetCounters> {
        self.lock()?
            .targets
            .get(&target)
            .copied()
            .ok_or(StoreError::TargetNotFound(target))
    }
}
