//! SQLite-backed record store with atomic transition commits.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    op::{CounterDelta, RecordOp, Transition},
    types::{CounterField, Polarity, TargetId, VoterId},
    vote::{TargetCounters, VoteRecord},
};

use super::{CommitError, CounterWriteError, RecordStore, StoreError, StoreResult};

/// SQLite implementation of [`crate::persist::RecordStore`].
///
/// The connection is driven from `spawn_blocking`. Unlike the default trait
/// behaviour, [`RecordStore::commit_transition`] runs the record write and the
/// counter write in one transaction.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens or creates a database at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "opened sqlite vote store");
        Self::init_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init_connection(Connection::open_in_memory()?)
    }

    fn init_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates or overwrites a target's counters.
    pub async fn put_target(&self, target: TargetId, counters: TargetCounters) -> StoreResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO vote_targets(target_kind, target_id, upvotes, downvotes)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(target_kind, target_id)
                 DO UPDATE SET upvotes = excluded.upvotes, downvotes = excluded.downvotes",
                params![
                    target.kind_code(),
                    target.uuid().to_string(),
                    to_sql_count(counters.upvotes)?,
                    to_sql_count(counters.downvotes)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// All records on one target, oldest first.
    pub async fn votes_for(&self, target: TargetId) -> StoreResult<Vec<VoteRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT voter_id, vote_type, created_at_ms FROM votes
                 WHERE target_kind = ?1 AND target_id = ?2
                 ORDER BY created_at_ms ASC",
            )?;
            let rows = stmt.query_map(
                params![target.kind_code(), target.uuid().to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?;

            let mut out = Vec::new();
            for row in rows {
                let (voter, vote_type, created_at_ms) = row?;
                let voter = Uuid::parse_str(&voter)
                    .map_err(|e| StoreError::Corrupt(format!("voter id {voter:?}: {e}")))?;
                out.push(decode_record(voter, target, vote_type, created_at_ms)?);
            }
            Ok(out)
        })
        .await
    }

    /// Rewrites a target's counters from its records. Returns `(before, after)`.
    pub async fn recount(&self, target: TargetId) -> StoreResult<(TargetCounters, TargetCounters)> {
        let (before, after) = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let before = select_counters(&tx, target)?;
                let (up, down): (i64, i64) = tx.query_row(
                    "SELECT COALESCE(SUM(vote_type = 1), 0), COALESCE(SUM(vote_type = -1), 0)
                     FROM votes WHERE target_kind = ?1 AND target_id = ?2",
                    params![target.kind_code(), target.uuid().to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                tx.execute(
                    "UPDATE vote_targets SET upvotes = ?1, downvotes = ?2
                     WHERE target_kind = ?3 AND target_id = ?4",
                    params![up, down, target.kind_code(), target.uuid().to_string()],
                )?;
                tx.commit()?;
                Ok((before, TargetCounters::new(from_sql_count(up)?, from_sql_count(down)?)))
            })
            .await?;
        tracing::info!(%target, ?before, ?after, "recounted target");
        Ok((before, after))
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("join error: {e}")))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<Option<VoteRecord>> {
        self.with_conn(move |conn| {
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT vote_type, created_at_ms FROM votes
                     WHERE voter_id = ?1 AND target_kind = ?2 AND target_id = ?3",
                    params![voter.to_string(), target.kind_code(), target.uuid().to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(vote_type, created_at_ms)| decode_record(voter, target, vote_type, created_at_ms))
                .transpose()
        })
        .await
    }

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.with_conn(move |conn| insert_record(conn, &record)).await
    }

    async fn upsert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        self.with_conn(move |conn| upsert_record(conn, &record)).await
    }

    async fn delete_vote(&self, voter: VoterId, target: TargetId) -> StoreResult<VoteRecord> {
        self.with_conn(move |conn| delete_record(conn, voter, target))
            .await
    }

    async fn increment_counter(
        &self,
        target: TargetId,
        field: CounterField,
        delta: i64,
    ) -> StoreResult<u64> {
        self.with_conn(move |conn| {
            apply_delta(conn, target, CounterDelta::single(field, delta))?;
            Ok(select_counters(conn, target)?.get(field))
        })
        .await
    }

    async fn read_counters(&self, target: TargetId) -> StoreResult<TargetCounters> {
        self.with_conn(move |conn| select_counters(conn, target))
            .await
    }

    async fn adjust_counters(
        &self,
        target: TargetId,
        delta: CounterDelta,
    ) -> Result<(), CounterWriteError> {
        Ok(self
            .with_conn(move |conn| apply_delta(conn, target, delta))
            .await?)
    }

    async fn commit_transition(
        &self,
        voter: VoterId,
        target: TargetId,
        transition: &Transition,
    ) -> Result<(), CommitError> {
        let transition = *transition;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            match transition.record {
                RecordOp::Insert(polarity) => {
                    insert_record(&tx, &VoteRecord::new(voter, target, polarity))?
                }
                RecordOp::Upsert(polarity) => {
                    upsert_record(&tx, &VoteRecord::new(voter, target, polarity))?
                }
                RecordOp::Delete => {
                    delete_record(&tx, voter, target)?;
                }
            }
            apply_delta(&tx, target, transition.delta)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(CommitError::Record)
    }
}

fn insert_record(conn: &Connection, record: &VoteRecord) -> StoreResult<()> {
    let res = conn.execute(
        "INSERT INTO votes(voter_id, target_kind, target_id, vote_type, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.voter_id.to_string(),
            record.target.kind_code(),
            record.target.uuid().to_string(),
            record.polarity.vote_type(),
            record.created_at_ms as i64,
        ],
    );
    match res {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::Conflict {
                voter: record.voter_id,
                target: record.target,
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn upsert_record(conn: &Connection, record: &VoteRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO votes(voter_id, target_kind, target_id, vote_type, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(voter_id, target_kind, target_id)
         DO UPDATE SET vote_type = excluded.vote_type",
        params![
            record.voter_id.to_string(),
            record.target.kind_code(),
            record.target.uuid().to_string(),
            record.polarity.vote_type(),
            record.created_at_ms as i64,
        ],
    )?;
    Ok(())
}

fn delete_record(conn: &Connection, voter: VoterId, target: TargetId) -> StoreResult<VoteRecord> {
    let removed: Option<(i64, i64)> = conn
        .query_row(
            "DELETE FROM votes WHERE voter_id = ?1 AND target_kind = ?2 AND target_id = ?3
             RETURNING vote_type, created_at_ms",
            params![voter.to_string(), target.kind_code(), target.uuid().to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (vote_type, created_at_ms) = removed.ok_or(StoreError::NotFound { voter, target })?;
    decode_record(voter, target, vote_type, created_at_ms)
}

fn apply_delta(conn: &Connection, target: TargetId, delta: CounterDelta) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE vote_targets
         SET upvotes = MAX(upvotes + ?1, 0), downvotes = MAX(downvotes + ?2, 0)
         WHERE target_kind = ?3 AND target_id = ?4",
        params![
            delta.upvotes,
            delta.downvotes,
            target.kind_code(),
            target.uuid().to_string()
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::TargetNotFound(target));
    }
    Ok(())
}

fn select_counters(conn: &Connection, target: TargetId) -> StoreResult<TargetCounters> {
    let row: Option<(i64, i64)> = conn
        .query_row(
            "SELECT upvotes, downvotes FROM vote_targets WHERE target_kind = ?1 AND target_id = ?2",
            params![target.kind_code(), target.uuid().to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (up, down) = row.ok_or(StoreError::TargetNotFound(target))?;
    Ok(TargetCounters::new(from_sql_count(up)?, from_sql_count(down)?))
}

fn decode_record(
    voter_id: VoterId,
    target: TargetId,
    vote_type: i64,
    created_at_ms: i64,
) -> StoreResult<VoteRecord> {
    let polarity = Polarity::try_from(vote_type)
        .map_err(|_| StoreError::Corrupt(format!("vote_type {vote_type}")))?;
    let created_at_ms = u64::try_from(created_at_ms)
        .map_err(|_| StoreError::Corrupt(format!("created_at_ms {created_at_ms}")))?;
    Ok(VoteRecord {
        voter_id,
        target,
        polarity,
        created_at_ms,
    })
}

fn to_sql_count(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter {value} out of range")))
}

fn from_sql_count(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative counter {value}")))
}
