//! Account manager tying the metadata maps to the balance store.
//!
//! The manager owns account records, the asset registry, and the
//! withdrawal registry; every value movement goes through the injected
//! [`BalanceStore`]. Operations live in sibling modules as impl blocks
//! on [`AccountManager`]: transfers in `transfer`, the credit engine in
//! `credit`, deposits and withdrawals in `funding`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use trellis_common::{AccountId, Amount, AssetCode, AssetId, BalanceId, TransferId};
use trellis_ledger::{Balance, BalanceKind, BalanceSpec, BalanceStore, LedgerError};

use crate::account::{Account, BalanceSnapshot, CreateAccountRequest};
use crate::config::AccountingConfig;
use crate::error::{CreateAccountError, LedgerInconsistency, QueryError};
use crate::funding::WithdrawalKind;
use crate::metrics::{Metrics, SharedMetrics};
use crate::registry::{self, Asset, AssetRegistry};

/// Hierarchical multi-asset account service over a balance store.
pub struct AccountManager {
    pub(crate) store: Arc<dyn BalanceStore>,
    pub(crate) registry: Arc<AssetRegistry>,
    pub(crate) accounts: DashMap<AccountId, Account>,
    pub(crate) withdrawals: DashMap<TransferId, WithdrawalKind>,
    pub(crate) config: AccountingConfig,
    pub(crate) metrics: SharedMetrics,
    /// Serializes credit-engine operations, which read the chain and
    /// lazily create balances before submitting their batch.
    pub(crate) credit_guard: Mutex<()>,
}

impl AccountManager {
    /// Create a manager over the given store.
    pub fn new(store: Arc<dyn BalanceStore>, config: AccountingConfig) -> Self {
        let registry = Arc::new(AssetRegistry::new(store.clone()));
        Self {
            store,
            registry,
            accounts: DashMap::new(),
            withdrawals: DashMap::new(),
            config,
            metrics: Arc::new(Metrics::new()),
            credit_guard: Mutex::new(()),
        }
    }

    /// Create an account, creating its asset on first use.
    ///
    /// A sub-account must carry the same asset as its super-account.
    #[instrument(skip(self, request), fields(asset = %request.asset_code, scale = request.asset_scale))]
    pub async fn create_account(
        &self,
        request: CreateAccountRequest,
    ) -> Result<Account, CreateAccountError> {
        let CreateAccountRequest {
            id,
            asset_code,
            asset_scale,
            super_account_id,
        } = request;

        let code = AssetCode::new(asset_code);
        if !registry::validate_asset(&code, asset_scale) {
            return Err(CreateAccountError::InvalidAsset);
        }

        if let Some(id) = id {
            if self.accounts.contains_key(&id) {
                return Err(CreateAccountError::DuplicateAccountId);
            }
        }

        // Guard scope: the map ref must not be held across an await
        let parent_asset_id = match super_account_id {
            Some(super_id) => {
                let parent = self
                    .accounts
                    .get(&super_id)
                    .ok_or(CreateAccountError::UnknownSuperAccount)?;
                Some(parent.asset_id)
            }
            None => None,
        };
        if let Some(asset_id) = parent_asset_id {
            let parent_asset = self.require_asset(asset_id)?;
            if parent_asset.code != code || parent_asset.scale != asset_scale {
                return Err(CreateAccountError::InvalidAsset);
            }
        }

        let asset = self.registry.get_or_create(&code, asset_scale).await?;

        let balance_id = BalanceId::new();
        let spec = BalanceSpec::new(balance_id, asset.unit, BalanceKind::HeldValue);
        self.store
            .create_balances(&[spec])
            .await
            .map_err(LedgerInconsistency::from)?;

        let id = id.unwrap_or_default();
        let account = Account::new(id, asset.id, super_account_id, balance_id);
        match self.accounts.entry(id) {
            // Lost a race on a caller-supplied id; the orphan balance
            // stays unreferenced and empty.
            Entry::Occupied(_) => return Err(CreateAccountError::DuplicateAccountId),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
            }
        }

        self.metrics.account_created();
        info!(account = %id, asset = %asset.code, scale = asset.scale, "Account created");
        Ok(account)
    }

    /// Fetch an account record.
    pub fn get_account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|account| account.clone())
    }

    /// Read every position an account holds in one store round-trip.
    ///
    /// Credit positions the account never opened read as zero.
    pub async fn get_account_balance(
        &self,
        account_id: AccountId,
    ) -> Result<BalanceSnapshot, QueryError> {
        let account = self
            .get_account(account_id)
            .ok_or(QueryError::UnknownAccount)?;

        let mut wanted = vec![account.balance_id];
        wanted.extend(account.trustline_balance_id);
        wanted.extend(account.credit_extended_balance_id);
        wanted.extend(account.borrowed_balance_id);
        wanted.extend(account.lent_balance_id);

        let by_id: HashMap<BalanceId, Balance> = self
            .store
            .read_balances(&wanted)
            .await
            .into_iter()
            .map(|balance| (balance.id, balance))
            .collect();
        let lookup = |id: BalanceId| -> Result<&Balance, QueryError> {
            by_id.get(&id).ok_or_else(|| {
                QueryError::Inconsistent(LedgerInconsistency::Store(LedgerError::BalanceNotFound {
                    id,
                }))
            })
        };
        let net_credit = |id: Option<BalanceId>| -> Result<Amount, QueryError> {
            id.map_or(Ok(0), |id| Ok(lookup(id)?.net_credit()))
        };
        let net_debit = |id: Option<BalanceId>| -> Result<Amount, QueryError> {
            id.map_or(Ok(0), |id| Ok(lookup(id)?.net_debit()))
        };

        Ok(BalanceSnapshot {
            balance: lookup(account.balance_id)?.net_credit(),
            available_credit: net_credit(account.trustline_balance_id)?,
            credit_extended: net_debit(account.credit_extended_balance_id)?,
            total_borrowed: net_credit(account.borrowed_balance_id)?,
            total_lent: net_debit(account.lent_balance_id)?,
        })
    }

    /// Net value held in an asset's liquidity pool.
    pub async fn get_liquidity_balance(
        &self,
        code: &AssetCode,
        scale: u8,
    ) -> Result<Amount, QueryError> {
        self.registry.get_liquidity_balance(code, scale).await
    }

    /// Net amount that has entered the node through settlement.
    pub async fn get_settlement_balance(
        &self,
        code: &AssetCode,
        scale: u8,
    ) -> Result<Amount, QueryError> {
        self.registry.get_settlement_balance(code, scale).await
    }

    /// Counters for this manager.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// The asset registry backing this manager.
    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Number of accounts created.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub(crate) fn require_asset(
        &self,
        id: AssetId,
    ) -> Result<Arc<Asset>, LedgerInconsistency> {
        self.registry
            .get_by_id(id)
            .ok_or(LedgerInconsistency::MissingAsset(id))
    }
}
