//! Vote ledger: the transition protocol between vote records and counters.

/// Ledger operations over a record store.
pub mod ledger;
