//! Credit engine over the account hierarchy.
//!
//! Credit lives in four balances per relationship: the child's
//! trustline (unused line) and borrowed (outstanding debt), and the
//! parent's credit_extended and lent mirrors. Every operation walks the
//! chain from the sub-account to its root and emits one leg set per
//! level, linked into a single batch, so notional positions propagate
//! through every intermediary while real value moves at most once,
//! between the root and the sub-account.

use std::collections::HashMap;

use tracing::{debug, instrument};

use trellis_common::{AccountId, Amount, BalanceId};
use trellis_ledger::{BalanceKind, BalanceSpec, LedgerError, TransferBatch, TransferSpec};

use crate::account::Account;
use crate::error::{CreditError, LedgerInconsistency};
use crate::manager::AccountManager;

/// Chain walks stop here; a longer chain means a corrupted hierarchy.
const MAX_CHAIN_DEPTH: usize = 64;

/// One parent-child relationship with all four credit balances present.
struct CreditLevel {
    child: AccountId,
    parent: AccountId,
    child_trustline: BalanceId,
    child_borrowed: BalanceId,
    parent_credit_extended: BalanceId,
    parent_lent: BalanceId,
}

/// What a balance in a credit batch belongs to, for mapping a
/// constraint violation back to a caller-facing error.
enum CreditRole {
    Main(AccountId),
    Trustline(AccountId),
    Borrowed(AccountId),
    CreditExtended(AccountId),
    Lent(AccountId),
}

#[derive(Default)]
struct LegPlan {
    legs: Vec<TransferSpec>,
    roles: HashMap<BalanceId, CreditRole>,
}

impl LegPlan {
    fn register(&mut self, level: &CreditLevel) {
        self.roles
            .insert(level.child_trustline, CreditRole::Trustline(level.child));
        self.roles
            .insert(level.child_borrowed, CreditRole::Borrowed(level.child));
        self.roles.insert(
            level.parent_credit_extended,
            CreditRole::CreditExtended(level.parent),
        );
        self.roles
            .insert(level.parent_lent, CreditRole::Lent(level.parent));
    }

    fn register_main(&mut self, balance: BalanceId, account: AccountId) {
        self.roles.insert(balance, CreditRole::Main(account));
    }

    fn leg(&mut self, source: BalanceId, destination: BalanceId, amount: Amount) {
        self.legs.push(TransferSpec::new(source, destination, amount));
    }

    fn credit_increase(&mut self, level: &CreditLevel, amount: Amount) {
        self.leg(level.parent_credit_extended, level.child_trustline, amount);
    }

    fn credit_decrease(&mut self, level: &CreditLevel, amount: Amount) {
        self.leg(level.child_trustline, level.parent_credit_extended, amount);
    }

    fn debt_increase(&mut self, level: &CreditLevel, amount: Amount) {
        self.leg(level.parent_lent, level.child_borrowed, amount);
    }

    fn debt_decrease(&mut self, level: &CreditLevel, amount: Amount) {
        self.leg(level.child_borrowed, level.parent_lent, amount);
    }
}

fn classify_violation(error: LedgerError, roles: &HashMap<BalanceId, CreditRole>) -> CreditError {
    let balance = match &error {
        LedgerError::ExceedsCredits { balance, .. }
        | LedgerError::ExceedsDebits { balance, .. } => *balance,
        _ => return CreditError::Inconsistent(LedgerInconsistency::Store(error)),
    };
    match roles.get(&balance) {
        Some(CreditRole::Main(account)) => CreditError::InsufficientBalance { account: *account },
        Some(CreditRole::Trustline(account)) | Some(CreditRole::CreditExtended(account)) => {
            CreditError::InsufficientCredit { account: *account }
        }
        Some(CreditRole::Borrowed(account)) | Some(CreditRole::Lent(account)) => {
            CreditError::InsufficientDebt { account: *account }
        }
        None => CreditError::Inconsistent(LedgerInconsistency::Store(error)),
    }
}

/// Pair up the chain into levels, failing a level whose credit
/// balances were never opened.
fn credit_levels<F>(chain: &[Account], missing: F) -> Result<Vec<CreditLevel>, CreditError>
where
    F: Fn(AccountId) -> CreditError,
{
    let mut levels = Vec::with_capacity(chain.len().saturating_sub(1));
    for pair in chain.windows(2) {
        let child = &pair[0];
        let parent = &pair[1];
        match (
            child.trustline_balance_id,
            child.borrowed_balance_id,
            parent.credit_extended_balance_id,
            parent.lent_balance_id,
        ) {
            (
                Some(child_trustline),
                Some(child_borrowed),
                Some(parent_credit_extended),
                Some(parent_lent),
            ) => levels.push(CreditLevel {
                child: child.id,
                parent: parent.id,
                child_trustline,
                child_borrowed,
                parent_credit_extended,
                parent_lent,
            }),
            _ => return Err(missing(child.id)),
        }
    }
    Ok(levels)
}

impl AccountManager {
    /// Extend a credit line to a descendant.
    ///
    /// Raises the trustline at every level from `sub_account_id` up to
    /// the root. With `auto_apply` the line is drawn immediately
    /// instead: debt positions open at every level and the root funds
    /// the sub-account directly.
    #[instrument(skip(self), fields(account = %account_id, sub_account = %sub_account_id, amount, auto_apply))]
    pub async fn extend_credit(
        &self,
        account_id: AccountId,
        sub_account_id: AccountId,
        amount: Amount,
        auto_apply: bool,
    ) -> Result<(), CreditError> {
        let _guard = self.credit_guard.lock().await;
        let mut chain = self.resolve_chain(account_id, sub_account_id)?;
        if amount == 0 {
            return Ok(());
        }
        self.ensure_credit_balances(&mut chain).await?;
        let levels = credit_levels(&chain, |child| {
            CreditError::Inconsistent(LedgerInconsistency::MissingAccount(child))
        })?;
        let ((sub_id, sub_balance), (root_id, root_balance)) =
            chain_endpoints(&chain, account_id)?;

        let mut plan = LegPlan::default();
        for level in &levels {
            plan.register(level);
            if auto_apply {
                plan.debt_increase(level, amount);
            } else {
                plan.credit_increase(level, amount);
            }
        }
        if auto_apply {
            plan.register_main(root_balance, root_id);
            plan.register_main(sub_balance, sub_id);
            plan.leg(root_balance, sub_balance, amount);
        }

        self.submit_credit_batch(plan).await?;
        self.metrics.credit_extended();
        debug!(levels = levels.len(), "Credit extended");
        Ok(())
    }

    /// Draw on an existing credit line.
    ///
    /// Converts unused line into debt at every level and moves real
    /// value from the root to the sub-account.
    #[instrument(skip(self), fields(account = %account_id, sub_account = %sub_account_id, amount))]
    pub async fn utilize_credit(
        &self,
        account_id: AccountId,
        sub_account_id: AccountId,
        amount: Amount,
    ) -> Result<(), CreditError> {
        let _guard = self.credit_guard.lock().await;
        let chain = self.resolve_chain(account_id, sub_account_id)?;
        if amount == 0 {
            return Ok(());
        }
        let levels = credit_levels(&chain, |child| CreditError::InsufficientCredit {
            account: child,
        })?;
        let ((sub_id, sub_balance), (root_id, root_balance)) =
            chain_endpoints(&chain, account_id)?;

        let mut plan = LegPlan::default();
        for level in &levels {
            plan.register(level);
            plan.credit_decrease(level, amount);
            plan.debt_increase(level, amount);
        }
        plan.register_main(root_balance, root_id);
        plan.register_main(sub_balance, sub_id);
        plan.leg(root_balance, sub_balance, amount);

        self.submit_credit_batch(plan).await?;
        self.metrics.credit_utilized();
        debug!(levels = levels.len(), "Credit utilized");
        Ok(())
    }

    /// Take back unused credit line at every level.
    #[instrument(skip(self), fields(account = %account_id, sub_account = %sub_account_id, amount))]
    pub async fn revoke_credit(
        &self,
        account_id: AccountId,
        sub_account_id: AccountId,
        amount: Amount,
    ) -> Result<(), CreditError> {
        let _guard = self.credit_guard.lock().await;
        let chain = self.resolve_chain(account_id, sub_account_id)?;
        if amount == 0 {
            return Ok(());
        }
        let levels = credit_levels(&chain, |child| CreditError::InsufficientCredit {
            account: child,
        })?;

        let mut plan = LegPlan::default();
        for level in &levels {
            plan.register(level);
            plan.credit_decrease(level, amount);
        }

        self.submit_credit_batch(plan).await?;
        self.metrics.credit_revoked();
        debug!(levels = levels.len(), "Credit revoked");
        Ok(())
    }

    /// Repay outstanding debt.
    ///
    /// Closes debt positions at every level while the sub-account repays
    /// the root in real value. With `revolve` the repaid amount returns
    /// to the credit line instead of retiring it.
    #[instrument(skip(self), fields(account = %account_id, sub_account = %sub_account_id, amount, revolve))]
    pub async fn settle_debt(
        &self,
        account_id: AccountId,
        sub_account_id: AccountId,
        amount: Amount,
        revolve: bool,
    ) -> Result<(), CreditError> {
        let _guard = self.credit_guard.lock().await;
        let chain = self.resolve_chain(account_id, sub_account_id)?;
        if amount == 0 {
            return Ok(());
        }
        let levels = credit_levels(&chain, |child| CreditError::InsufficientDebt {
            account: child,
        })?;
        let ((sub_id, sub_balance), (root_id, root_balance)) =
            chain_endpoints(&chain, account_id)?;

        let mut plan = LegPlan::default();
        for level in &levels {
            plan.register(level);
            plan.debt_decrease(level, amount);
        }
        plan.register_main(root_balance, root_id);
        plan.register_main(sub_balance, sub_id);
        plan.leg(sub_balance, root_balance, amount);
        if revolve {
            for level in &levels {
                plan.credit_increase(level, amount);
            }
        }

        self.submit_credit_batch(plan).await?;
        self.metrics.debt_settled();
        debug!(levels = levels.len(), revolve, "Debt settled");
        Ok(())
    }

    /// Walk from the sub-account to its root, collecting the chain.
    ///
    /// `account_id` must be a proper ancestor somewhere on that path.
    fn resolve_chain(
        &self,
        account_id: AccountId,
        sub_account_id: AccountId,
    ) -> Result<Vec<Account>, CreditError> {
        if account_id == sub_account_id {
            return Err(CreditError::SameAccounts);
        }
        let sub = self
            .get_account(sub_account_id)
            .ok_or(CreditError::UnknownAccount)?;
        if sub.super_account_id.is_none() {
            return Err(CreditError::UnknownSuperAccount);
        }

        let mut related = false;
        let mut chain = vec![sub];
        while let Some(parent_id) = chain.last().and_then(|account| account.super_account_id) {
            if chain.len() > MAX_CHAIN_DEPTH {
                return Err(CreditError::UnrelatedSubAccount);
            }
            let parent = self
                .get_account(parent_id)
                .ok_or(LedgerInconsistency::MissingAccount(parent_id))?;
            related = related || parent.id == account_id;
            chain.push(parent);
        }

        if related {
            Ok(chain)
        } else {
            Err(CreditError::UnrelatedSubAccount)
        }
    }

    /// Open the credit balances every chain account is missing, in one
    /// store batch, then record the new ids on the account records.
    async fn ensure_credit_balances(
        &self,
        chain: &mut [Account],
    ) -> Result<(), LedgerInconsistency> {
        let unit = match chain.first() {
            Some(sub) => self.require_asset(sub.asset_id)?.unit,
            None => return Ok(()),
        };

        // The hierarchy shares one asset by construction
        let mut specs = Vec::new();
        let last = chain.len() - 1;
        for (position, account) in chain.iter_mut().enumerate() {
            if position < last && !account.has_trustline() {
                let trustline = BalanceId::new();
                let borrowed = BalanceId::new();
                specs.push(BalanceSpec::new(trustline, unit, BalanceKind::HeldValue));
                specs.push(BalanceSpec::new(borrowed, unit, BalanceKind::HeldValue));
                account.trustline_balance_id = Some(trustline);
                account.borrowed_balance_id = Some(borrowed);
            }
            if position > 0 && !account.has_credit_extended() {
                let credit_extended = BalanceId::new();
                let lent = BalanceId::new();
                specs.push(BalanceSpec::new(credit_extended, unit, BalanceKind::Obligation));
                specs.push(BalanceSpec::new(lent, unit, BalanceKind::Obligation));
                account.credit_extended_balance_id = Some(credit_extended);
                account.lent_balance_id = Some(lent);
            }
        }
        if specs.is_empty() {
            return Ok(());
        }

        self.store.create_balances(&specs).await?;
        for account in chain.iter() {
            if let Some(mut stored) = self.accounts.get_mut(&account.id) {
                stored.trustline_balance_id = account.trustline_balance_id;
                stored.borrowed_balance_id = account.borrowed_balance_id;
                stored.credit_extended_balance_id = account.credit_extended_balance_id;
                stored.lent_balance_id = account.lent_balance_id;
            }
        }
        debug!(balances = specs.len(), "Credit balances opened");
        Ok(())
    }

    async fn submit_credit_batch(&self, plan: LegPlan) -> Result<(), CreditError> {
        let LegPlan { legs, roles } = plan;
        let batch = TransferBatch::single_phase(legs);
        match self.store.apply_transfers(&batch).await {
            Ok(()) => Ok(()),
            Err(error) => Err(classify_violation(error, &roles)),
        }
    }
}

/// The sub-account and root (id, main balance) pairs of a chain.
fn chain_endpoints(
    chain: &[Account],
    account_id: AccountId,
) -> Result<((AccountId, BalanceId), (AccountId, BalanceId)), CreditError> {
    match (chain.first(), chain.last()) {
        (Some(sub), Some(root)) => Ok(((sub.id, sub.balance_id), (root.id, root.balance_id))),
        _ => Err(CreditError::Inconsistent(LedgerInconsistency::MissingAccount(account_id))),
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

    /// root -> mid -> leaf, all in USD cents.
    async fn setup_tree(manager: &AccountManager) -> (AccountId, AccountId, AccountId) {
        let root = manager
            .create_account(CreateAccountRequest::new("USD", 2))
            .await
            .unwrap();
        let mid = manager
            .create_account(CreateAccountRequest::new("USD", 2).with_super_account(root.id))
            .await
            .unwrap();
        let leaf = manager
            .create_account(CreateAccountRequest::new("USD", 2).with_super_account(mid.id))
            .await
            .unwrap();
        (root.id, mid.id, leaf.id)
    }

    #[tokio::test]
    async fn test_extend_raises_line_at_every_level() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;

        manager.extend_credit(root, leaf, 10, false).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        let root_view = manager.get_account_balance(root).await.unwrap();
        assert_eq!(leaf_view.available_credit, 10);
        assert_eq!(mid_view.available_credit, 10);
        assert_eq!(mid_view.credit_extended, 10);
        assert_eq!(root_view.credit_extended, 10);
        // No real value moved and no debt opened
        assert_eq!(leaf_view.balance, 0);
        assert_eq!(root_view.balance, 0);
        assert_eq!(leaf_view.total_borrowed, 0);
        assert_eq!(mid_view.total_borrowed, 0);
    }

    #[tokio::test]
    async fn test_extends_accumulate() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;

        manager.extend_credit(root, leaf, 10, false).await.unwrap();
        manager.extend_credit(root, leaf, 15, false).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        assert_eq!(leaf_view.available_credit, 25);
    }

    #[tokio::test]
    async fn test_auto_apply_moves_value_and_opens_debt() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();

        manager.extend_credit(root, leaf, 10, true).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        let root_view = manager.get_account_balance(root).await.unwrap();
        assert_eq!(leaf_view.balance, 10);
        assert_eq!(root_view.balance, 90);
        assert_eq!(mid_view.balance, 0);
        assert_eq!(leaf_view.total_borrowed, 10);
        assert_eq!(mid_view.total_borrowed, 10);
        assert_eq!(mid_view.total_lent, 10);
        assert_eq!(root_view.total_lent, 10);
        // The line itself is untouched; the debt legs replace it
        assert_eq!(leaf_view.available_credit, 0);
        assert_eq!(mid_view.available_credit, 0);
    }

    #[tokio::test]
    async fn test_auto_apply_needs_root_funds() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;

        let result = manager.extend_credit(root, leaf, 10, true).await;

        assert_eq!(
            result,
            Err(CreditError::InsufficientBalance { account: root })
        );
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        assert_eq!(mid_view.total_borrowed, 0);
        assert_eq!(mid_view.total_lent, 0);
    }

    #[tokio::test]
    async fn test_utilize_converts_line_to_debt() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 50, false).await.unwrap();

        manager.utilize_credit(root, leaf, 20).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        let root_view = manager.get_account_balance(root).await.unwrap();
        assert_eq!(leaf_view.balance, 20);
        assert_eq!(root_view.balance, 80);
        assert_eq!(leaf_view.available_credit, 30);
        assert_eq!(mid_view.available_credit, 30);
        assert_eq!(mid_view.credit_extended, 30);
        assert_eq!(root_view.credit_extended, 30);
        assert_eq!(leaf_view.total_borrowed, 20);
        assert_eq!(mid_view.total_borrowed, 20);
        assert_eq!(mid_view.total_lent, 20);
        assert_eq!(root_view.total_lent, 20);
    }

    #[tokio::test]
    async fn test_utilize_beyond_line() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 10, false).await.unwrap();

        let result = manager.utilize_credit(root, leaf, 20).await;

        assert_eq!(result, Err(CreditError::InsufficientCredit { account: leaf }));
    }

    #[tokio::test]
    async fn test_utilize_without_root_funds_changes_nothing() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;
        manager.extend_credit(root, leaf, 50, false).await.unwrap();

        let result = manager.utilize_credit(root, leaf, 20).await;

        assert_eq!(
            result,
            Err(CreditError::InsufficientBalance { account: root })
        );
        // The credit-decrease legs earlier in the batch left no trace
        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        assert_eq!(leaf_view.available_credit, 50);
        assert_eq!(mid_view.available_credit, 50);
        assert_eq!(leaf_view.total_borrowed, 0);
    }

    #[tokio::test]
    async fn test_utilize_with_no_line_at_all() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();

        let result = manager.utilize_credit(root, leaf, 5).await;

        assert_eq!(result, Err(CreditError::InsufficientCredit { account: leaf }));
    }

    #[tokio::test]
    async fn test_revoke_shrinks_line() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;
        manager.extend_credit(root, leaf, 50, false).await.unwrap();

        manager.revoke_credit(root, leaf, 20).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        let root_view = manager.get_account_balance(root).await.unwrap();
        assert_eq!(leaf_view.available_credit, 30);
        assert_eq!(mid_view.available_credit, 30);
        assert_eq!(mid_view.credit_extended, 30);
        assert_eq!(root_view.credit_extended, 30);
    }

    #[tokio::test]
    async fn test_revoke_beyond_unused_line() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 50, false).await.unwrap();
        manager.utilize_credit(root, leaf, 20).await.unwrap();

        let result = manager.revoke_credit(root, leaf, 40).await;

        assert_eq!(result, Err(CreditError::InsufficientCredit { account: leaf }));
    }

    #[tokio::test]
    async fn test_settle_without_revolve_retires_debt() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 10, true).await.unwrap();

        manager.settle_debt(root, leaf, 5, false).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        let root_view = manager.get_account_balance(root).await.unwrap();
        assert_eq!(leaf_view.total_borrowed, 5);
        assert_eq!(mid_view.total_borrowed, 5);
        assert_eq!(mid_view.total_lent, 5);
        assert_eq!(root_view.total_lent, 5);
        assert_eq!(leaf_view.balance, 5);
        assert_eq!(root_view.balance, 95);
        // Without revolve the line does not come back
        assert_eq!(leaf_view.available_credit, 0);
        assert_eq!(root_view.credit_extended, 0);
    }

    #[tokio::test]
    async fn test_settle_with_revolve_restores_line() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 10, true).await.unwrap();

        manager.settle_debt(root, leaf, 5, true).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        assert_eq!(leaf_view.total_borrowed, 5);
        assert_eq!(leaf_view.available_credit, 5);
        assert_eq!(mid_view.available_credit, 5);
        assert_eq!(mid_view.credit_extended, 5);
    }

    #[tokio::test]
    async fn test_settle_beyond_debt() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 10, true).await.unwrap();

        let result = manager.settle_debt(root, leaf, 20, false).await;

        assert_eq!(result, Err(CreditError::InsufficientDebt { account: leaf }));
    }

    #[tokio::test]
    async fn test_settle_with_no_debt_open() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.extend_credit(root, leaf, 10, false).await.unwrap();

        let result = manager.settle_debt(root, leaf, 5, false).await;

        assert_eq!(result, Err(CreditError::InsufficientDebt { account: leaf }));
    }

    #[tokio::test]
    async fn test_settle_needs_sub_account_funds() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();
        manager.extend_credit(root, leaf, 10, true).await.unwrap();
        // Drain the leaf so it cannot repay
        manager
            .transfer(leaf, root, 10, None)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();

        let result = manager.settle_debt(root, leaf, 5, false).await;

        assert_eq!(result, Err(CreditError::InsufficientBalance { account: leaf }));
        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        assert_eq!(leaf_view.total_borrowed, 10);
    }

    #[tokio::test]
    async fn test_extend_from_mid_ancestor_still_reaches_root() {
        let manager = setup_manager();
        let (root, mid, leaf) = setup_tree(&manager).await;

        manager.extend_credit(mid, leaf, 10, false).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        let mid_view = manager.get_account_balance(mid).await.unwrap();
        let root_view = manager.get_account_balance(root).await.unwrap();
        assert_eq!(leaf_view.available_credit, 10);
        assert_eq!(mid_view.available_credit, 10);
        assert_eq!(root_view.credit_extended, 10);
    }

    #[tokio::test]
    async fn test_chain_validation() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        let stranger_root = manager
            .create_account(CreateAccountRequest::new("USD", 2))
            .await
            .unwrap();
        let stranger_leaf = manager
            .create_account(
                CreateAccountRequest::new("USD", 2).with_super_account(stranger_root.id),
            )
            .await
            .unwrap();

        assert_eq!(
            manager.extend_credit(root, root, 10, false).await,
            Err(CreditError::SameAccounts)
        );
        assert_eq!(
            manager.extend_credit(root, AccountId::new(), 10, false).await,
            Err(CreditError::UnknownAccount)
        );
        assert_eq!(
            manager.extend_credit(leaf, root, 10, false).await,
            Err(CreditError::UnknownSuperAccount)
        );
        assert_eq!(
            manager.extend_credit(root, stranger_leaf.id, 10, false).await,
            Err(CreditError::UnrelatedSubAccount)
        );
        // A descendant is not an ancestor
        assert_eq!(
            manager.extend_credit(leaf, stranger_leaf.id, 10, false).await,
            Err(CreditError::UnrelatedSubAccount)
        );
    }

    #[tokio::test]
    async fn test_zero_amount_is_a_noop() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;

        manager.extend_credit(root, leaf, 0, false).await.unwrap();

        let leaf_view = manager.get_account_balance(leaf).await.unwrap();
        assert_eq!(leaf_view.available_credit, 0);
        // Nothing was opened for the no-op
        assert!(manager.get_account(leaf).unwrap().trustline_balance_id.is_none());
    }

    #[tokio::test]
    async fn test_chain_depth_is_bounded() {
        let manager = setup_manager();
        let root = manager
            .create_account(CreateAccountRequest::new("USD", 2))
            .await
            .unwrap();
        let mut current = root.id;
        for _ in 0..MAX_CHAIN_DEPTH + 1 {
            let child = manager
                .create_account(CreateAccountRequest::new("USD", 2).with_super_account(current))
                .await
                .unwrap();
            current = child.id;
        }

        let result = manager.extend_credit(root.id, current, 10, false).await;

        assert_eq!(result, Err(CreditError::UnrelatedSubAccount));
    }

    #[tokio::test]
    async fn test_credit_metrics() {
        let manager = setup_manager();
        let (root, _, leaf) = setup_tree(&manager).await;
        manager.deposit(root, 100, None).await.unwrap();

        manager.extend_credit(root, leaf, 50, false).await.unwrap();
        manager.utilize_credit(root, leaf, 20).await.unwrap();
        manager.revoke_credit(root, leaf, 10).await.unwrap();
        manager.settle_debt(root, leaf, 5, true).await.unwrap();

        let snapshot = manager.metrics().snapshot();
        assert_eq!(snapshot.credit_extensions, 1);
        assert_eq!(snapshot.credit_utilizations, 1);
        assert_eq!(snapshot.credit_revocations, 1);
        assert_eq!(snapshot.debt_settlements, 1);
    }
}
