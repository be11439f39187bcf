//! Deposits and withdrawals against the settlement boundary.
//!
//! External value enters and leaves through each asset's settlement
//! balance. Deposits post immediately; withdrawals reserve until
//! finalized or rolled back, so the funds cannot be double-spent while
//! the external payout is in flight. Caller-supplied ids become the
//! underlying transfer ids, which is what makes retries idempotent.

use tracing::{debug, instrument};

use trellis_common::{AccountId, Amount, AssetCode, AssetId, TransferId};
use trellis_ledger::{LedgerError, TransferBatch, TransferSpec};

use crate::error::{DepositError, LedgerInconsistency, WithdrawalError};
use crate::manager::AccountManager;

/// What a pending withdrawal draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalKind {
    /// Reserved against an account's balance.
    Account(AccountId),
    /// Reserved against an asset's liquidity pool.
    Liquidity(AssetId),
}

impl AccountManager {
    /// Credit an account with value arriving from outside the node.
    ///
    /// Reusing an id returns `DepositExists` and moves nothing.
    #[instrument(skip(self, id), fields(account = %account_id, amount))]
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: Amount,
        id: Option<&str>,
    ) -> Result<TransferId, DepositError> {
        let transfer_id = parse_transfer_id(id, DepositError::InvalidId)?;
        if amount == 0 {
            return Err(DepositError::InvalidAmount);
        }
        let account = self
            .get_account(account_id)
            .ok_or(DepositError::UnknownAccount)?;
        let asset = self.require_asset(account.asset_id)?;

        let leg = TransferSpec::with_id(
            transfer_id,
            asset.settlement_balance_id,
            account.balance_id,
            amount,
        );
        self.store
            .apply_transfers(&TransferBatch::single_phase(vec![leg]))
            .await
            .map_err(classify_deposit)?;

        self.metrics.deposit_applied();
        debug!(transfer = %transfer_id, "Deposit applied");
        Ok(transfer_id)
    }

    /// Seed an asset's liquidity pool from outside the node, creating
    /// the asset on first use.
    #[instrument(skip(self, id), fields(asset = %code, scale, amount))]
    pub async fn deposit_liquidity(
        &self,
        code: &AssetCode,
        scale: u8,
        amount: Amount,
        id: Option<&str>,
    ) -> Result<TransferId, DepositError> {
        let transfer_id = parse_transfer_id(id, DepositError::InvalidId)?;
        if amount == 0 {
            return Err(DepositError::InvalidAmount);
        }
        if !crate::registry::validate_asset(code, scale) {
            return Err(DepositError::InvalidAsset);
        }
        let asset = self.registry.get_or_create(code, scale).await?;

        let leg = TransferSpec::with_id(
            transfer_id,
            asset.settlement_balance_id,
            asset.liquidity_balance_id,
            amount,
        );
        self.store
            .apply_transfers(&TransferBatch::single_phase(vec![leg]))
            .await
            .map_err(classify_deposit)?;

        self.metrics.deposit_applied();
        debug!(transfer = %transfer_id, "Liquidity deposit applied");
        Ok(transfer_id)
    }

    /// Reserve an account's funds for payout outside the node.
    ///
    /// The reservation holds until [`finalize_withdrawal`] or
    /// [`rollback_withdrawal`], or until the configured withdrawal
    /// timeout lapses if one is set.
    ///
    /// [`finalize_withdrawal`]: AccountManager::finalize_withdrawal
    /// [`rollback_withdrawal`]: AccountManager::rollback_withdrawal
    #[instrument(skip(self, id), fields(account = %account_id, amount))]
    pub async fn create_withdrawal(
        &self,
        account_id: AccountId,
        amount: Amount,
        id: Option<&str>,
    ) -> Result<TransferId, WithdrawalError> {
        let transfer_id = parse_transfer_id(id, WithdrawalError::InvalidId)?;
        if amount == 0 {
            return Err(WithdrawalError::InvalidAmount);
        }
        let account = self
            .get_account(account_id)
            .ok_or(WithdrawalError::UnknownAccount)?;
        let asset = self.require_asset(account.asset_id)?;

        let leg = TransferSpec::with_id(
            transfer_id,
            account.balance_id,
            asset.settlement_balance_id,
            amount,
        );
        let batch = TransferBatch::two_phase(vec![leg], self.config.withdrawal_timeout);
        self.store
            .apply_transfers(&batch)
            .await
            .map_err(|error| classify_withdrawal(error, WithdrawalError::InsufficientBalance))?;

        self.withdrawals
            .insert(transfer_id, WithdrawalKind::Account(account_id));
        self.metrics.withdrawal_created();
        debug!(transfer = %transfer_id, "Withdrawal reserved");
        Ok(transfer_id)
    }

    /// Reserve pool funds for payout outside the node.
    #[instrument(skip(self, id), fields(asset = %code, scale, amount))]
    pub async fn create_liquidity_withdrawal(
        &self,
        code: &AssetCode,
        scale: u8,
        amount: Amount,
        id: Option<&str>,
    ) -> Result<TransferId, WithdrawalError> {
        let transfer_id = parse_transfer_id(id, WithdrawalError::InvalidId)?;
        if amount == 0 {
            return Err(WithdrawalError::InvalidAmount);
        }
        let asset = self
            .registry
            .get(code, scale)
            .ok_or(WithdrawalError::UnknownAsset)?;

        let leg = TransferSpec::with_id(
            transfer_id,
            asset.liquidity_balance_id,
            asset.settlement_balance_id,
            amount,
        );
        let batch = TransferBatch::two_phase(vec![leg], self.config.withdrawal_timeout);
        self.store
            .apply_transfers(&batch)
            .await
            .map_err(|error| classify_withdrawal(error, WithdrawalError::InsufficientLiquidity))?;

        self.withdrawals
            .insert(transfer_id, WithdrawalKind::Liquidity(asset.id));
        self.metrics.withdrawal_created();
        debug!(transfer = %transfer_id, "Liquidity withdrawal reserved");
        Ok(transfer_id)
    }

    /// Make a reserved withdrawal permanent after the external payout
    /// succeeded.
    #[instrument(skip_all, fields(id))]
    pub async fn finalize_withdrawal(&self, id: &str) -> Result<(), WithdrawalError> {
        let transfer_id =
            TransferId::parse(id).map_err(|_| WithdrawalError::InvalidId)?;
        if !self.withdrawals.contains_key(&transfer_id) {
            return Err(WithdrawalError::UnknownWithdrawal);
        }

        self.store
            .commit_transfers(&[transfer_id])
            .await
            .map_err(classify_resolution)?;

        self.metrics.withdrawal_finalized();
        debug!(transfer = %transfer_id, "Withdrawal finalized");
        Ok(())
    }

    /// Release a reserved withdrawal after the external payout failed.
    #[instrument(skip_all, fields(id))]
    pub async fn rollback_withdrawal(&self, id: &str) -> Result<(), WithdrawalError> {
        let transfer_id =
            TransferId::parse(id).map_err(|_| WithdrawalError::InvalidId)?;
        if !self.withdrawals.contains_key(&transfer_id) {
            return Err(WithdrawalError::UnknownWithdrawal);
        }

        self.store
            .rollback_transfers(&[transfer_id])
            .await
            .map_err(classify_resolution)?;

        self.metrics.withdrawal_rolled_back();
        debug!(transfer = %transfer_id, "Withdrawal rolled back");
        Ok(())
    }

    /// What a withdrawal id was reserved against, if it exists.
    pub fn withdrawal_kind(&self, id: TransferId) -> Option<WithdrawalKind> {
        self.withdrawals.get(&id).map(|kind| *kind)
    }
}

fn parse_transfer_id<E>(id: Option<&str>, invalid: E) -> Result<TransferId, E> {
    match id {
        Some(raw) => TransferId::parse(raw).map_err(|_| invalid),
        None => Ok(TransferId::new()),
    }
}

fn classify_deposit(error: LedgerError) -> DepositError {
    match error {
        LedgerError::TransferExists { .. } => DepositError::DepositExists,
        other => DepositError::Inconsistent(LedgerInconsistency::Store(other)),
    }
}

/// A withdrawal batch has one leg: a violated debit is the source
/// running dry, a violated credit is the settlement constraint.
fn classify_withdrawal(error: LedgerError, source_dry: WithdrawalError) -> WithdrawalError {
    match error {
        LedgerError::TransferExists { .. } => WithdrawalError::WithdrawalExists,
        LedgerError::ExceedsCredits { .. } => source_dry,
        LedgerError::ExceedsDebits { .. } => WithdrawalError::InsufficientSettlementBalance,
        other => WithdrawalError::Inconsistent(LedgerInconsistency::Store(other)),
    }
}

fn classify_resolution(error: LedgerError) -> WithdrawalError {
    match error {
        LedgerError::TransferAlreadyCommitted { .. } => WithdrawalError::AlreadyFinalized,
        LedgerError::TransferAlreadyRolledBack { .. } => WithdrawalError::AlreadyRolledBack,
        LedgerError::TransferExpired { .. } => WithdrawalError::Expired,
        other => WithdrawalError::Inconsistent(LedgerInconsistency::Store(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::CreateAccountRequest;
    use crate::config::AccountingConfig;
    use std::sync::Arc;
    use trellis_ledger::MemoryLedger;

    fn setup_manager() -> AccountManager {
        AccountManager::new(Arc::new(MemoryLedger::new()), AccountingConfig::default())
    }

    fn setup_expiring_manager() -> AccountManager {
        let config = AccountingConfig {
            withdrawal_timeout: Some(chrono::Duration::milliseconds(20)),
            ..AccountingConfig::default()
        };
        AccountManager::new(Arc::new(MemoryLedger::new()), config)
    }

    async fn usd_account(manager: &AccountManager) -> AccountId {
        manager
            .create_account(CreateAccountRequest::new("USD", 2))
            .await
            .unwrap()
            .id
    }

    async fn balance_of(manager: &AccountManager, id: AccountId) -> Amount {
        manager.get_account_balance(id).await.unwrap().balance
    }

    #[tokio::test]
    async fn test_deposit_funds_account_through_settlement() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        let usd = AssetCode::new("USD");

        manager.deposit(account, 100, None).await.unwrap();

        assert_eq!(balance_of(&manager, account).await, 100);
        assert_eq!(manager.get_settlement_balance(&usd, 2).await, Ok(100));
        assert_eq!(manager.get_liquidity_balance(&usd, 2).await, Ok(0));
    }

    #[tokio::test]
    async fn test_deposit_is_idempotent() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        let id = TransferId::new().to_string();

        let first = manager.deposit(account, 10, Some(&id)).await;
        let second = manager.deposit(account, 10, Some(&id)).await;

        assert!(first.is_ok());
        assert_eq!(second, Err(DepositError::DepositExists));
        assert_eq!(balance_of(&manager, account).await, 10);
    }

    #[tokio::test]
    async fn test_deposit_validation() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;

        assert_eq!(
            manager.deposit(account, 10, Some("not-a-uuid")).await,
            Err(DepositError::InvalidId)
        );
        assert_eq!(
            manager.deposit(account, 0, None).await,
            Err(DepositError::InvalidAmount)
        );
        assert_eq!(
            manager.deposit(AccountId::new(), 10, None).await,
            Err(DepositError::UnknownAccount)
        );
    }

    #[tokio::test]
    async fn test_liquidity_deposit_creates_asset() {
        let manager = setup_manager();
        let eur = AssetCode::new("EUR");

        manager.deposit_liquidity(&eur, 2, 50, None).await.unwrap();

        assert_eq!(manager.get_liquidity_balance(&eur, 2).await, Ok(50));
        assert_eq!(manager.get_settlement_balance(&eur, 2).await, Ok(50));
    }

    #[tokio::test]
    async fn test_liquidity_deposit_rejects_malformed_asset() {
        let manager = setup_manager();

        let result = manager
            .deposit_liquidity(&AssetCode::new("eur"), 2, 50, None)
            .await;

        assert_eq!(result, Err(DepositError::InvalidAsset));
    }

    #[tokio::test]
    async fn test_withdrawal_lifecycle() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        let usd = AssetCode::new("USD");
        manager.deposit(account, 100, None).await.unwrap();

        let id = manager.create_withdrawal(account, 40, None).await.unwrap();
        assert_eq!(
            manager.withdrawal_kind(id),
            Some(WithdrawalKind::Account(account))
        );
        // Reserved but not yet settled
        assert_eq!(balance_of(&manager, account).await, 100);

        manager.finalize_withdrawal(&id.to_string()).await.unwrap();

        assert_eq!(balance_of(&manager, account).await, 60);
        assert_eq!(manager.get_settlement_balance(&usd, 2).await, Ok(60));
    }

    #[tokio::test]
    async fn test_withdrawal_reserves_funds() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        manager.deposit(account, 100, None).await.unwrap();

        manager.create_withdrawal(account, 80, None).await.unwrap();
        let second = manager.create_withdrawal(account, 30, None).await;

        assert_eq!(second, Err(WithdrawalError::InsufficientBalance));
    }

    #[tokio::test]
    async fn test_withdrawal_rollback_releases_funds() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        manager.deposit(account, 100, None).await.unwrap();

        let id = manager.create_withdrawal(account, 80, None).await.unwrap();
        manager.rollback_withdrawal(&id.to_string()).await.unwrap();

        assert_eq!(balance_of(&manager, account).await, 100);
        manager.create_withdrawal(account, 80, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_withdrawal_id_reuse_rejected() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        manager.deposit(account, 100, None).await.unwrap();
        let id = TransferId::new().to_string();

        manager
            .create_withdrawal(account, 10, Some(&id))
            .await
            .unwrap();
        let reused = manager.create_withdrawal(account, 10, Some(&id)).await;

        assert_eq!(reused, Err(WithdrawalError::WithdrawalExists));
    }

    #[tokio::test]
    async fn test_finalize_scope_is_withdrawals_only() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        let deposit_id = manager.deposit(account, 100, None).await.unwrap();

        let unknown = manager.finalize_withdrawal(&TransferId::new().to_string()).await;
        let not_a_withdrawal = manager
            .finalize_withdrawal(&deposit_id.to_string())
            .await;

        assert_eq!(unknown, Err(WithdrawalError::UnknownWithdrawal));
        assert_eq!(not_a_withdrawal, Err(WithdrawalError::UnknownWithdrawal));
        assert_eq!(
            manager.finalize_withdrawal("not-a-uuid").await,
            Err(WithdrawalError::InvalidId)
        );
    }

    #[tokio::test]
    async fn test_resolution_is_terminal() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        manager.deposit(account, 100, None).await.unwrap();

        let finalized = manager.create_withdrawal(account, 10, None).await.unwrap();
        let finalized = finalized.to_string();
        manager.finalize_withdrawal(&finalized).await.unwrap();
        assert_eq!(
            manager.finalize_withdrawal(&finalized).await,
            Err(WithdrawalError::AlreadyFinalized)
        );
        assert_eq!(
            manager.rollback_withdrawal(&finalized).await,
            Err(WithdrawalError::AlreadyFinalized)
        );

        let rolled_back = manager.create_withdrawal(account, 10, None).await.unwrap();
        let rolled_back = rolled_back.to_string();
        manager.rollback_withdrawal(&rolled_back).await.unwrap();
        assert_eq!(
            manager.rollback_withdrawal(&rolled_back).await,
            Err(WithdrawalError::AlreadyRolledBack)
        );
        assert_eq!(
            manager.finalize_withdrawal(&rolled_back).await,
            Err(WithdrawalError::AlreadyRolledBack)
        );
    }

    #[tokio::test]
    async fn test_unresolved_withdrawal_expires() {
        let manager = setup_expiring_manager();
        let account = usd_account(&manager).await;
        manager.deposit(account, 100, None).await.unwrap();

        let id = manager.create_withdrawal(account, 40, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        assert_eq!(
            manager.finalize_withdrawal(&id.to_string()).await,
            Err(WithdrawalError::Expired)
        );
        assert_eq!(balance_of(&manager, account).await, 100);
        manager.create_withdrawal(account, 100, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_liquidity_withdrawal() {
        let manager = setup_manager();
        let eur = AssetCode::new("EUR");
        manager.deposit_liquidity(&eur, 2, 50, None).await.unwrap();

        let id = manager
            .create_liquidity_withdrawal(&eur, 2, 30, None)
            .await
            .unwrap();
        manager.finalize_withdrawal(&id.to_string()).await.unwrap();

        assert_eq!(manager.get_liquidity_balance(&eur, 2).await, Ok(20));
        assert_eq!(manager.get_settlement_balance(&eur, 2).await, Ok(20));
        assert!(matches!(
            manager.withdrawal_kind(id),
            Some(WithdrawalKind::Liquidity(_))
        ));
    }

    #[tokio::test]
    async fn test_liquidity_withdrawal_limits() {
        let manager = setup_manager();
        let eur = AssetCode::new("EUR");
        manager.deposit_liquidity(&eur, 2, 50, None).await.unwrap();

        let over = manager.create_liquidity_withdrawal(&eur, 2, 60, None).await;
        let unknown = manager
            .create_liquidity_withdrawal(&AssetCode::new("JPY"), 0, 10, None)
            .await;

        assert_eq!(over, Err(WithdrawalError::InsufficientLiquidity));
        assert_eq!(unknown, Err(WithdrawalError::UnknownAsset));
    }

    #[tokio::test]
    async fn test_funding_metrics() {
        let manager = setup_manager();
        let account = usd_account(&manager).await;
        manager.deposit(account, 100, None).await.unwrap();

        let finalized = manager.create_withdrawal(account, 10, None).await.unwrap();
        let rolled_back = manager.create_withdrawal(account, 10, None).await.unwrap();
        manager
            .finalize_withdrawal(&finalized.to_string())
            .await
            .unwrap();
        manager
            .rollback_withdrawal(&rolled_back.to_string())
            .await
            .unwrap();

        let snapshot = manager.metrics().snapshot();
        assert_eq!(snapshot.deposits_total, 1);
        assert_eq!(snapshot.withdrawals_created, 2);
        assert_eq!(snapshot.withdrawals_finalized, 1);
        assert_eq!(snapshot.withdrawals_rolled_back, 1);
        assert_eq!(snapshot.withdrawals_pending, 0);
    }
}
