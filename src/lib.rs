//! Thread and comment voting with denormalized vote counters.
//!
//! A voter's vote on a target moves between no vote, up, and down. Each cast
//! writes the voter's record and then adjusts the target's `upvotes` and
//! `downvotes` counters. Stores that cannot commit both writes together
//! report a failed counter write as [`error::VoteError::CounterUpdateFailed`].
//!
//! # Examples
//!
//! Direct ledger use over [`persist::memory::InMemoryRecordStore`]:
//! ```
//! use threadvote::{
//!     core::ledger::VoteLedger,
//!     identity::Identity,
//!     persist::memory::InMemoryRecordStore,
//!     types::{Polarity, TargetId},
//!     vote::TargetCounters,
//! };
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let thread = TargetId::Thread(Uuid::new_v4());
//! let store = InMemoryRecordStore::new().with_target(thread, TargetCounters::new(5, 2));
//! let ledger = VoteLedger::new(store);
//!
//! let me = Identity::new(Uuid::new_v4());
//! let mut view = ledger.open_view(Some(&me), thread).await.expect("open");
//! ledger.cast_vote(Some(&me), &mut view, Polarity::Up).await.expect("vote");
//! assert_eq!(view.score(), 4);
//! assert_eq!(view.current_vote, Some(Polarity::Up));
//! # }
//! ```
//!
//! Runtime usage with a SQLite store:
//! ```no_run
//! use threadvote::{
//!     core::ledger::VoteLedger,
//!     identity::Identity,
//!     persist::sqlite::SqliteRecordStore,
//!     runtime::handle::{spawn_vote_ledger, RuntimeConfig},
//!     types::TargetId,
//!     vote::TargetCounters,
//! };
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteRecordStore::open("votes.db").expect("open sqlite");
//! let thread = TargetId::Thread(Uuid::new_v4());
//! store.put_target(thread, TargetCounters::default()).await.expect("target");
//!
//! let handle = spawn_vote_ledger(VoteLedger::new(store), RuntimeConfig::default());
//! let me = Identity::new(Uuid::new_v4());
//! handle.cast_vote(Some(me), thread, -1).await.expect("vote");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Ledger configuration.
pub mod config;
/// Vote ledger core.
pub mod core;
/// Ledger error taxonomy.
pub mod error;
/// Acting-user identity.
pub mod identity;
/// Transition planning.
pub mod op;
/// Record store abstraction and backends.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
/// Vote records, counters, and views.
pub mod vote;
