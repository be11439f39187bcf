//! Account-to-account transfers.
//!
//! Every transfer is reserved first and resolved through the returned
//! [`Transaction`] handle. Amount differences and cross-asset hops are
//! routed through the per-asset liquidity pools, all legs linked into
//! one batch so no partial movement is ever visible.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use trellis_common::{AccountId, Amount, AssetCode, BalanceId, TransferId};
use trellis_ledger::{BalanceStore, LedgerError, TransferBatch, TransferSpec};

use crate::error::{LedgerInconsistency, TransferError};
use crate::manager::AccountManager;
use crate::metrics::SharedMetrics;

/// What a balance in a transfer batch belongs to, for mapping a
/// constraint violation back to a caller-facing error.
enum LegRole {
    Account(AccountId),
    Liquidity(AssetCode),
}

impl AccountManager {
    /// Move value between two accounts, reserving until resolution.
    ///
    /// With one asset on both sides `destination_amount` defaults to
    /// `source_amount`; a differing amount routes the excess into, or
    /// the shortfall out of, the asset's liquidity pool. Across assets
    /// `destination_amount` is mandatory and both sides trade against
    /// their own pool.
    #[instrument(skip(self), fields(source = %source_account, destination = %destination_account, source_amount))]
    pub async fn transfer(
        &self,
        source_account: AccountId,
        destination_account: AccountId,
        source_amount: Amount,
        destination_amount: Option<Amount>,
    ) -> Result<Transaction, TransferError> {
        if source_account == destination_account {
            return Err(TransferError::SameAccounts);
        }
        if source_amount == 0 {
            return Err(TransferError::InvalidSourceAmount);
        }
        if destination_amount == Some(0) {
            return Err(TransferError::InvalidDestinationAmount);
        }

        let source = self
            .get_account(source_account)
            .ok_or(TransferError::UnknownSourceAccount)?;
        let destination = self
            .get_account(destination_account)
            .ok_or(TransferError::UnknownDestinationAccount)?;
        let source_asset = self.require_asset(source.asset_id)?;
        let destination_asset = self.require_asset(destination.asset_id)?;

        let mut roles = HashMap::new();
        roles.insert(source.balance_id, LegRole::Account(source.id));
        roles.insert(destination.balance_id, LegRole::Account(destination.id));
        roles.insert(
            source_asset.liquidity_balance_id,
            LegRole::Liquidity(source_asset.code.clone()),
        );
        roles.insert(
            destination_asset.liquidity_balance_id,
            LegRole::Liquidity(destination_asset.code.clone()),
        );

        let mut legs = Vec::with_capacity(2);
        if source_asset.id == destination_asset.id {
            let destination_amount = destination_amount.unwrap_or(source_amount);
            legs.push(TransferSpec::new(
                source.balance_id,
                destination.balance_id,
                source_amount.min(destination_amount),
            ));
            if destination_amount < source_amount {
                // Destination takes less; the excess stays in the pool
                legs.push(TransferSpec::new(
                    source.balance_id,
                    source_asset.liquidity_balance_id,
                    source_amount - destination_amount,
                ));
            } else if destination_amount > source_amount {
                // Destination takes more; the pool funds the difference
                legs.push(TransferSpec::new(
                    source_asset.liquidity_balance_id,
                    destination.balance_id,
                    destination_amount - source_amount,
                ));
            }
        } else {
            let destination_amount =
                destination_amount.ok_or(TransferError::InvalidDestinationAmount)?;
            legs.push(TransferSpec::new(
                source.balance_id,
                source_asset.liquidity_balance_id,
                source_amount,
            ));
            legs.push(TransferSpec::new(
                destination_asset.liquidity_balance_id,
                destination.balance_id,
                destination_amount,
            ));
        }

        let batch = TransferBatch::two_phase(legs, Some(self.config.transfer_timeout));
        let ids = batch.ids();
        if let Err(error) = self.store.apply_transfers(&batch).await {
            return Err(classify_violation(error, &roles));
        }

        self.metrics.transfer_initiated();
        debug!(legs = ids.len(), "Transfer reserved");
        Ok(Transaction {
            store: self.store.clone(),
            ids,
            metrics: self.metrics.clone(),
        })
    }
}

fn classify_violation(error: LedgerError, roles: &HashMap<BalanceId, LegRole>) -> TransferError {
    let balance = match &error {
        LedgerError::ExceedsCredits { balance, .. }
        | LedgerError::ExceedsDebits { balance, .. } => *balance,
        _ => return TransferError::Inconsistent(LedgerInconsistency::Store(error)),
    };
    match roles.get(&balance) {
        Some(LegRole::Account(account)) => TransferError::InsufficientBalance {
            account: *account,
        },
        Some(LegRole::Liquidity(asset)) => TransferError::InsufficientLiquidity {
            asset: asset.clone(),
        },
        None => TransferError::Inconsistent(LedgerInconsistency::Store(error)),
    }
}

/// Handle over a reserved transfer's legs.
///
/// Resolution is idempotent in outcome: the store holds the state, so
/// a repeated or conflicting call reports the terminal result without
/// touching balances again.
pub struct Transaction {
    store: Arc<dyn BalanceStore>,
    ids: Vec<TransferId>,
    metrics: SharedMetrics,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Transaction {
    /// Make every reserved leg permanent.
    pub async fn commit(&self) -> Result<(), TransferError> {
        match self.store.commit_transfers(&self.ids).await {
            Ok(()) => {
                self.metrics.transfer_committed();
                Ok(())
            }
            Err(error) => Err(self.resolution_error(error)),
        }
    }

    /// Release every reserved leg.
    pub async fn rollback(&self) -> Result<(), TransferError> {
        match self.store.rollback_transfers(&self.ids).await {
            Ok(()) => {
                self.metrics.transfer_rolled_back();
                Ok(())
            }
            Err(error) => Err(self.resolution_error(error)),
        }
    }

    /// Ids of the underlying ledger transfers, in leg order.
    pub fn transfer_ids(&self) -> &[TransferId] {
        &self.ids
    }

    fn resolution_error(&self, error: LedgerError) -> TransferError {
        match error {
            LedgerError::TransferAlreadyCommitted { .. } => TransferError::TransferAlreadyCommitted,
            LedgerError::TransferAlreadyRolledBack { .. } => TransferError::TransferAlreadyRejected,
            LedgerError::TransferExpired { .. } => {
                self.metrics.transfer_expired();
                TransferError::TransferExpired
            }
            other => TransferError::Inconsistent(LedgerInconsistency::Store(other)),
        }
    }
}
