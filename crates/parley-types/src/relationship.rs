//! Friend relationship state machine.
//!
//! A relationship is tracked per unordered pair of users. The transitions are
//! pure; persisting the result is the store's job, which applies a transition
//! and writes the new state inside one transaction.
//!
//! ```text
//! Unconnected --send(A,B)--> Pending(A->B) --accept--> Friends
//! Pending(A->B) --reject--> Unconnected
//! ```

use thiserror::Error;
use uuid::Uuid;

use crate::pair::PairKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    Unconnected,
    Pending { from: Uuid, to: Uuid },
    Friends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Send { from: Uuid, to: Uuid },
    /// `to` accepts the pending request sent by `from`.
    Accept { from: Uuid, to: Uuid },
    /// `to` rejects the pending request sent by `from`.
    Reject { from: Uuid, to: Uuid },
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot send request to self")]
    SelfRequest,
    #[error("Already connected")]
    AlreadyFriends,
    #[error("Request already pending")]
    AlreadyPending,
    #[error("No friend request from this user")]
    NoPendingRequest,
}

impl TransitionError {
    /// Conflicts describe a contradictory existing state; everything else is
    /// an operation that is invalid from the current state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyFriends | Self::AlreadyPending)
    }
}

impl RelationState {
    pub fn apply(self, transition: Transition) -> Result<RelationState, TransitionError> {
        match transition {
            Transition::Send { from, to } => {
                if from == to {
                    return Err(TransitionError::SelfRequest);
                }
                match self {
                    Self::Unconnected => Ok(Self::Pending { from, to }),
                    Self::Pending { .. } => Err(TransitionError::AlreadyPending),
                    Self::Friends => Err(TransitionError::AlreadyFriends),
                }
            }
            Transition::Accept { from, to } => match self {
                Self::Pending { from: f, to: t } if f == from && t == to => Ok(Self::Friends),
                _ => Err(TransitionError::NoPendingRequest),
            },
            Transition::Reject { from, to } => match self {
                Self::Pending { from: f, to: t } if f == from && t == to => Ok(Self::Unconnected),
                _ => Err(TransitionError::NoPendingRequest),
            },
        }
    }

    /// Rebuild the state from the stored status column of a pair.
    pub fn from_stored(pair: &PairKey, status: Option<RelationStatus>) -> Self {
        match status {
            None => Self::Unconnected,
            Some(RelationStatus::PendingLow) => Self::Pending {
                from: pair.low(),
                to: pair.high(),
            },
            Some(RelationStatus::PendingHigh) => Self::Pending {
                from: pair.high(),
                to: pair.low(),
            },
            Some(RelationStatus::Friends) => Self::Friends,
        }
    }

    /// Status to store for this state, or `None` when the row should not exist.
    pub fn to_stored(self, pair: &PairKey) -> Option<RelationStatus> {
        match self {
            Self::Unconnected => None,
            Self::Pending { from, .. } if from == pair.low() => Some(RelationStatus::PendingLow),
            Self::Pending { .. } => Some(RelationStatus::PendingHigh),
            Self::Friends => Some(RelationStatus::Friends),
        }
    }
}

/// Stored form of a relationship. `PendingLow` means the lower id of the
/// pair sent the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStatus {
    PendingLow,
    PendingHigh,
    Friends,
}

impl RelationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingLow => "pending_low",
            Self::PendingHigh => "pending_high",
            Self::Friends => "friends",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_low" => Some(Self::PendingLow),
            "pending_high" => Some(Self::PendingHigh),
            "friends" => Some(Self::Friends),
            _ => None,
        }
    }
}
