//! Vote transition planning.
//!
//! | current | requested | next | record op    | counters                  |
//! |---------|-----------|------|--------------|---------------------------|
//! | none    | +1        | up   | insert(+1)   | upvotes + 1               |
//! | none    | -1        | down | insert(-1)   | downvotes + 1             |
//! | up      | +1        | none | delete       | upvotes - 1               |
//! | down    | -1        | none | delete       | downvotes - 1             |
//! | up      | -1        | down | upsert(-1)   | upvotes - 1, downvotes + 1|
//! | down    | +1        | up   | upsert(+1)   | downvotes - 1, upvotes + 1|
//!
//! Decrements are clamped at zero wherever they are applied.

use serde::{Deserialize, Serialize};

use crate::types::{CounterField, Polarity};

/// Signed change to a target's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterDelta {
    /// Change to `upvotes`.
    pub upvotes: i64,
    /// Change to `downvotes`.
    pub downvotes: i64,
}

impl CounterDelta {
    /// Delta touching a single field.
    pub fn single(field: CounterField, delta: i64) -> Self {
        let mut out = Self::default();
        match field {
            CounterField::Upvotes => out.upvotes = delta,
            CounterField::Downvotes => out.downvotes = delta,
        }
        out
    }

    /// Non-zero per-field components.
    pub fn fields(&self) -> impl Iterator<Item = (CounterField, i64)> {
        [
            (CounterField::Upvotes, self.upvotes),
            (CounterField::Downvotes, self.downvotes),
        ]
        .into_iter()
        .filter(|(_, d)| *d != 0)
    }

    /// True when nothing changes.
    pub fn is_zero(&self) -> bool {
        self.upvotes == 0 && self.downvotes == 0
    }

    /// Delta that undoes this one.
    pub fn negated(self) -> Self {
        Self {
            upvotes: -self.upvotes,
            downvotes: -self.downvotes,
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            upvotes: self.upvotes + other.upvotes,
            downvotes: self.downvotes + other.downvotes,
        }
    }
}

/// Write applied to the voter's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOp {
    /// Create a record; fails if one already exists.
    Insert(Polarity),
    /// Create or replace the record.
    Upsert(Polarity),
    /// Remove the record.
    Delete,
}

/// Shape of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// none -> up/down.
    Create,
    /// up/down -> none.
    Retract,
    /// up <-> down.
    Switch,
}

/// Planned state change for one (voter, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Vote before the cast.
    pub from: Option<Polarity>,
    /// Vote after the cast.
    pub to: Option<Polarity>,
    /// Record write that realizes the change.
    pub record: RecordOp,
    /// Record write that undoes `record`. A retraction is undone by
    /// re-inserting the removed record itself when it is known.
    pub inverse: RecordOp,
    /// Counter change that matches `record`.
    pub delta: CounterDelta,
}

impl Transition {
    /// Plans the transition for `requested` given the current vote.
    ///
    /// Requesting the current polarity retracts, requesting the opposite one
    /// switches, and requesting anything from no vote creates.
    pub fn plan(current: Option<Polarity>, requested: Polarity) -> Self {
        let bump = |p: Polarity, d: i64| CounterDelta::single(p.counter_field(), d);
        match current {
            None => Self {
                from: None,
                to: Some(requested),
                record: RecordOp::Insert(requested),
                inverse: RecordOp::Delete,
                delta: bump(requested, 1),
            },
            Some(prev) if prev == requested => Self {
                from: Some(prev),
                to: None,
                record: RecordOp::Delete,
                inverse: RecordOp::Insert(prev),
                delta: bump(prev, -1),
            },
            Some(prev) => Self {
                from: Some(prev),
                to: Some(requested),
                record: RecordOp::Upsert(requested),
                inverse: RecordOp::Upsert(prev),
                delta: bump(prev, -1).add(bump(requested, 1)),
            },
        }
    }

    /// Classifies this transition.
    pub fn kind(&self) -> TransitionKind {
        match (self.from, self.to) {
            (None, _) => TransitionKind::Create,
            (Some(_), None) => TransitionKind::Retract,
            (Some(_), Some(_)) => TransitionKind::Switch,
        }
    }
}
