#![allow(dead_code)]

use std::{
    ops::Range,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use threadvote::{
    identity::Identity,
    op::CounterDelta,
    persist::{
        memory::InMemoryRecordStore, CounterWriteError, RecordStore, StoreError, StoreResult,
    },
    types::{CounterField, TargetId, VoterId},
    vote::{TargetCounters, VoteRecord},
};
use uuid::Uuid;

/// Counting, fault-injecting wrapper over the in-memory store.
///
/// Keeps the trait's default sequential `commit_transition`, so record and
/// counter writes fail independently.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: InMemoryRecordStore,
    pub reads: AtomicUsize,
    pub record_writes: AtomicUsize,
    pub counter_writes: AtomicUsize,
    /// Record writes that may still succeed; `usize::MAX` means unlimited.
    record_budget: AtomicUsize,
    fail_counters: AtomicBool,
    write_delay: Option<Duration>,
}

impl FlakyStore {
    pub fn new(target: TargetId, counters: TargetCounters) -> Self {
        Self {
            inner: InMemoryRecordStore::new().with_target(target, counters),
            record_budget: AtomicUsize::new(usize::MAX),
            ..Self::default()
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn fail_record_writes(&self) {
        self.record_budget.store(0, Ordering::SeqCst);
    }

    pub fn allow_record_writes(&self, n: usize) {
        self.record_budget.store(n, Ordering::SeqCst);
    }

    pub fn fail_counter_writes(&self, fail: bool) {
        self.fail_counters.store(fail, Ordering::SeqCst);
    }

    pub fn total_writes(&self) -> usize {
        self.record_writes.load(Ordering::SeqCst) + self.counter_writes.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_writes() + self.reads.load(Ordering::SeqCst)
    }

    async fn record_write(&self) -> StoreResult<()> {
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let allowed = self
            .record_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok();
        if allowed {
            Ok(())
        } else {
            Err(StoreError::Unavailable("simulated record write failure".into()))
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn find_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<Option<VoteRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_vote(voter, target).await
    }

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.record_write().await?;
        self.inner.insert_vote(record).await
    }

    async fn upsert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.record_write().await?;
        self.inner.upsert_vote(record).await
    }

    async fn delete_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<VoteRecord> {
        self.record_write().await?;
        self.inner.delete_vote(voter, target).await
    }

    async fn increment_counter(
        &self,
        target: TargetId,
        field: CounterField,
        delta: i64,
    ) -> StoreResult<u64> {
        self.counter_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_counters.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated counter write failure".into()));
        }
        self.inner.increment_counter(target, field, delta).await
    }

    async fn adjust_counters(
        &self,
        target: TargetId,
        delta: CounterDelta,
    ) -> Result<(), CounterWriteError> {
        self.counter_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_counters.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated counter write failure".into()).into());
        }
        self.inner.adjust_counters(target, delta).await
    }

    async fn read_counters(&self, target: TargetId) -> StoreResult<TargetCounters> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_counters(target).await
    }
}

/// Store whose counter write updates one field at a time, like a row store
/// that only offers a per-column increment. Implements only the required
/// trait methods.
#[derive(Debug, Default)]
pub struct FieldStore {
    pub inner: InMemoryRecordStore,
    pub record_writes: AtomicUsize,
    pub counter_writes: AtomicUsize,
    increments: AtomicUsize,
    /// Indices of field increments that fail.
    failing: Mutex<Range<usize>>,
}

impl FieldStore {
    pub fn new(target: TargetId, counters: TargetCounters) -> Self {
        Self {
            inner: InMemoryRecordStore::new().with_target(target, counters),
            ..Self::default()
        }
    }

    /// Lets the next `skip` field increments through, then fails `count`.
    pub fn fail_next_increments(&self, skip: usize, count: usize) {
        let start = self.increments.load(Ordering::SeqCst) + skip;
        *self.failing.lock().expect("lock") = start..start + count;
    }

    pub fn total_writes(&self) -> usize {
        self.record_writes.load(Ordering::SeqCst) + self.counter_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FieldStore {
    async fn find_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<Option<VoteRecord>> {
        self.inner.find_vote(voter, target).await
    }

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_vote(record).await
    }

    async fn upsert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_vote(record).await
    }

    async fn delete_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<VoteRecord> {
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_vote(voter, target).await
    }

    async fn increment_counter(
        &self,
        target: TargetId,
        field: CounterField,
        delta: i64,
    ) -> StoreResult<u64> {
        let n = self.increments.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().expect("lock").contains(&n) {
            return Err(StoreError::Unavailable(format!("simulated {field:?} write failure")));
        }
        self.inner.increment_counter(target, field, delta).await
    }

    async fn adjust_counters(
        &self,
        target: TargetId,
        delta: CounterDelta,
    ) -> Result<(), CounterWriteError> {
        self.counter_writes.fetch_add(1, Ordering::SeqCst);
        let mut applied = CounterDelta::default();
        for (field, d) in delta.fields() {
            if let Err(source) = self.increment_counter(target, field, d).await {
                return Err(CounterWriteError { applied, source });
            }
            match field {
                CounterField::Upvotes => applied.upvotes = d,
                CounterField::Downvotes => applied.downvotes = d,
            }
        }
        Ok(())
    }

    async fn read_counters(&self, target: TargetId) -> StoreResult<TargetCounters> {
        self.inner.read_counters(target).await
    }
}

pub fn thread() -> TargetId {
    TargetId::Thread(Uuid::new_v4())
}

pub fn user() -> Identity {
    Identity::new(Uuid::new_v4())
}
