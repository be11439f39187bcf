//! Ledger error types.

use thiserror::Error;
use trellis_common::{BalanceId, TransferId};

/// Errors raised by a balance store.
///
/// Constraint violations carry the index of the offending leg within
/// its batch and the balance that refused it, so callers can translate
/// them into account-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A batch carried no legs, or a commit or rollback no ids.
    #[error("Batch contains no transfers")]
    EmptyBatch,

    /// Balance id already taken.
    #[error("Balance already exists: {id}")]
    BalanceExists { id: BalanceId },

    /// Referenced balance was never created.
    #[error("Balance not found: {id}")]
    BalanceNotFound { id: BalanceId },

    /// Transfer id already used by an earlier submission.
    #[error("Transfer already exists: {id}")]
    TransferExists { id: TransferId },

    /// Referenced transfer was never applied.
    #[error("Transfer not found: {id}")]
    TransferNotFound { id: TransferId },

    /// Commit or rollback arrived after a commit.
    #[error("Transfer already committed: {id}")]
    TransferAlreadyCommitted { id: TransferId },

    /// Commit or rollback arrived after a rollback.
    #[error("Transfer already rolled back: {id}")]
    TransferAlreadyRolledBack { id: TransferId },

    /// Reservation lapsed before the commit or rollback arrived.
    #[error("Transfer expired: {id}")]
    TransferExpired { id: TransferId },

    /// A leg names the same balance on both sides.
    #[error("Transfer at index {index} debits and credits the same balance")]
    SameBalance { index: usize },

    /// A leg moves nothing.
    #[error("Transfer at index {index} has a zero amount")]
    ZeroAmount { index: usize },

    /// A debit would push a held-value balance past its credits.
    #[error("Transfer at index {index} would overdraw balance {balance}")]
    ExceedsCredits { index: usize, balance: BalanceId },

    /// A credit would push an obligation balance past its debits.
    #[error("Transfer at index {index} would over-repay balance {balance}")]
    ExceedsDebits { index: usize, balance: BalanceId },

    /// A counter would leave the u64 range.
    #[error("Transfer at index {index} overflows a counter on balance {balance}")]
    AmountOverflow { index: usize, balance: BalanceId },
}

impl LedgerError {
    /// Check if the error reports a balance constraint refusing a leg.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::ExceedsCredits { .. }
                | LedgerError::ExceedsDebits { .. }
                | LedgerError::AmountOverflow { .. }
        )
    }

    /// Get a stable code for logs and client responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::EmptyBatch => "EMPTY_BATCH",
            LedgerError::BalanceExists { .. } => "BALANCE_EXISTS",
            LedgerError::BalanceNotFound { .. } => "BALANCE_NOT_FOUND",
            LedgerError::TransferExists { .. } => "TRANSFER_EXISTS",
            LedgerError::TransferNotFound { .. } => "TRANSFER_NOT_FOUND",
            LedgerError::TransferAlreadyCommitted { .. } => "TRANSFER_ALREADY_COMMITTED",
            LedgerError::TransferAlreadyRolledBack { .. } => "TRANSFER_ALREADY_ROLLED_BACK",
            LedgerError::TransferExpired { .. } => "TRANSFER_EXPIRED",
            LedgerError::SameBalance { .. } => "SAME_BALANCE",
            LedgerError::ZeroAmount { .. } => "ZERO_AMOUNT",
            LedgerError::ExceedsCredits { .. } => "EXCEEDS_CREDITS",
            LedgerError::ExceedsDebits { .. } => "EXCEEDS_DEBITS",
            LedgerError::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
