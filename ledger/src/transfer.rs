//! Transfer legs, batches, and the pending-transfer state machine.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use trellis_common::{expires_in, now, Amount, BalanceId, Timestamp, TransferId};

/// A single directional movement of value between two balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    /// Caller-chosen id, doubling as the idempotency key.
    pub id: TransferId,
    /// Balance to debit.
    pub source: BalanceId,
    /// Balance to credit.
    pub destination: BalanceId,
    /// Amount in the asset's smallest unit.
    pub amount: Amount,
}

impl TransferSpec {
    /// Create a leg with a fresh random id.
    pub fn new(source: BalanceId, destination: BalanceId, amount: Amount) -> Self {
        Self {
            id: TransferId::new(),
            source,
            destination,
            amount,
        }
    }

    /// Create a leg under a caller-supplied id.
    pub fn with_id(
        id: TransferId,
        source: BalanceId,
        destination: BalanceId,
        amount: Amount,
    ) -> Self {
        Self {
            id,
            source,
            destination,
            amount,
        }
    }
}

/// How a batch settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Accept every leg immediately.
    Post,
    /// Hold every leg until an explicit commit or rollback. A `None`
    /// timeout keeps the reservation open indefinitely.
    Reserve { timeout: Option<Duration> },
}

impl TransferMode {
    /// Check whether the mode leaves transfers pending.
    pub fn is_two_phase(&self) -> bool {
        matches!(self, TransferMode::Reserve { .. })
    }
}

/// A group of legs that succeed or fail as one.
///
/// Legs apply in order, so within a post-mode batch an earlier leg's
/// credit can fund a later leg's debit. Reservations never fund
/// anything until committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferBatch {
    legs: Vec<TransferSpec>,
    mode: TransferMode,
}

impl TransferBatch {
    /// Build a batch that settles immediately.
    pub fn single_phase(legs: Vec<TransferSpec>) -> Self {
        Self {
            legs,
            mode: TransferMode::Post,
        }
    }

    /// Build a batch that reserves and waits for a commit or rollback.
    pub fn two_phase(legs: Vec<TransferSpec>, timeout: Option<Duration>) -> Self {
        Self {
            legs,
            mode: TransferMode::Reserve { timeout },
        }
    }

    /// Legs in application order.
    pub fn legs(&self) -> &[TransferSpec] {
        &self.legs
    }

    /// Settlement mode for the whole batch.
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Ids of every leg, in order.
    pub fn ids(&self) -> Vec<TransferId> {
        self.legs.iter().map(|leg| leg.id).collect()
    }

    /// Number of legs.
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    /// Check for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

/// Lifecycle state of a submitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    /// Reserved, awaiting commit or rollback.
    Pending,
    /// Accepted into the balances.
    Committed,
    /// Reservation released by the caller.
    RolledBack,
    /// Reservation released by deadline.
    Expired,
}

impl TransferState {
    /// Check if this is a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferState::Pending)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TransferState] {
        match self {
            TransferState::Pending => &[
                TransferState::Committed,
                TransferState::RolledBack,
                TransferState::Expired,
            ],
            TransferState::Committed => &[],
            TransferState::RolledBack => &[],
            TransferState::Expired => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// A transfer as stored, with its lifecycle state and deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// The movement this record tracks.
    pub spec: TransferSpec,
    /// Current lifecycle state.
    pub state: TransferState,
    /// Submission time.
    pub submitted_at: Timestamp,
    /// Reservation deadline. `None` for transfers that never expire.
    pub expires_at: Option<Timestamp>,
}

impl TransferRecord {
    /// Record a reservation, expiring after `timeout` if one is given.
    pub fn pending(spec: TransferSpec, timeout: Option<Duration>) -> Self {
        Self {
            spec,
            state: TransferState::Pending,
            submitted_at: now(),
            expires_at: timeout.map(expires_in),
        }
    }

    /// Record an immediately accepted transfer.
    pub fn committed(spec: TransferSpec) -> Self {
        Self {
            spec,
            state: TransferState::Committed,
            submitted_at: now(),
            expires_at: None,
        }
    }

    /// Check whether the reservation deadline has passed at `at`.
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        match self.expires_at {
            Some(deadline) => self.state == TransferState::Pending && deadline <= at,
            None => false,
        }
    }
}
