//! Balance store trait.

use async_trait::async_trait;

use crate::balance::{Balance, BalanceSpec};
use crate::error::LedgerResult;
use crate::transfer::TransferBatch;
use trellis_common::{BalanceId, TransferId};

/// Storage backend for balances and transfers.
///
/// Every method is a serializable atomic unit: a batch either lands in
/// full or leaves no trace, and no interleaving with a concurrent call
/// is observable. The in-memory store serializes writes behind one
/// lock; a database-backed store would hold row locks for the same
/// effect.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Create every balance in the batch, or none of them.
    ///
    /// Fails with `BalanceExists` if any id is already taken, including
    /// a duplicate within the batch itself.
    async fn create_balances(&self, specs: &[BalanceSpec]) -> LedgerResult<()>;

    /// Apply a transfer batch, honoring its mode.
    ///
    /// Legs apply in submission order. Resubmitting any leg id fails
    /// the whole batch with `TransferExists` regardless of the outcome
    /// of the earlier submission.
    async fn apply_transfers(&self, batch: &TransferBatch) -> LedgerResult<()>;

    /// Accept the reservations held by the given pending transfers.
    ///
    /// Validates every id before moving anything: one ineligible
    /// transfer fails the whole call and commits none of them.
    async fn commit_transfers(&self, ids: &[TransferId]) -> LedgerResult<()>;

    /// Release the reservations held by the given pending transfers.
    async fn rollback_transfers(&self, ids: &[TransferId]) -> LedgerResult<()>;

    /// Read balances by id. Unknown ids are skipped, so the result can
    /// be shorter than the request.
    async fn read_balances(&self, ids: &[BalanceId]) -> Vec<Balance>;
}
