//! Shared identifiers, vote polarity, and counter field enums.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VoteError;

/// Identity of a voting user.
pub type VoterId = Uuid;
/// Thread identifier.
pub type ThreadId = Uuid;
/// Comment identifier.
pub type CommentId = Uuid;

/// Anything that can be voted on and carries its own counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetId {
    /// A forum thread.
    Thread(ThreadId),
    /// A comment on a thread.
    Comment(CommentId),
}

impl TargetId {
    /// Discriminant stored alongside the id in persistent tables.
    pub fn kind_code(&self) -> i64 {
        match self {
            Self::Thread(_) => 1,
            Self::Comment(_) => 2,
        }
    }

    /// Underlying row id.
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Thread(id) | Self::Comment(id) => *id,
        }
    }

    /// Rebuilds a target from its stored kind code and id.
    pub fn from_parts(kind_code: i64, id: Uuid) -> Option<Self> {
        match kind_code {
            1 => Some(Self::Thread(id)),
            2 => Some(Self::Comment(id)),
            _ => None,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "thread:{id}"),
            Self::Comment(id) => write!(f, "comment:{id}"),
        }
    }
}

/// Direction of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// +1.
    Up,
    /// -1.
    Down,
}

impl Polarity {
    /// Stored `vote_type` value.
    pub fn vote_type(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    /// The other direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Counter that tallies votes of this polarity.
    pub fn counter_field(self) -> CounterField {
        match self {
            Self::Up => CounterField::Upvotes,
            Self::Down => CounterField::Downvotes,
        }
    }
}

impl TryFrom<i64> for Polarity {
    type Error = VoteError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(VoteError::InvalidPolarity(other)),
        }
    }
}

/// Denormalized counter column on a vote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterField {
    /// Count of +1 votes.
    Upvotes,
    /// Count of -1 votes.
    Downvotes,
}

impl CounterField {
    /// Column name in the target tables.
    pub fn column(self) -> &'static str {
        match self {
            Self::Upvotes => "upvotes",
            Self::Downvotes => "downvotes",
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
