//! Account records for the credit/value tree.

use serde::{Deserialize, Serialize};
use trellis_common::{now, AccountId, Amount, AssetId, BalanceId, Timestamp};

/// A node in the account forest.
///
/// The main balance always exists. The four credit balances are filled
/// in the first time a credit relationship touches this account: the
/// trustline and borrowed pair when it first acts as a child, the
/// credit-extended and lent pair when it first acts as a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id.
    pub id: AccountId,
    /// Asset this account is denominated in. Must equal the parent's.
    pub asset_id: AssetId,
    /// Metadata flag owned by external stores; carried, never acted on.
    pub disabled: bool,
    /// Parent account, if any.
    pub super_account_id: Option<AccountId>,
    /// Real value held.
    pub balance_id: BalanceId,
    /// Unused credit available from the parent.
    pub trustline_balance_id: Option<BalanceId>,
    /// Debt owed to the parent.
    pub borrowed_balance_id: Option<BalanceId>,
    /// Credit granted to children, not yet utilized.
    pub credit_extended_balance_id: Option<BalanceId>,
    /// Aggregate amount loaned to children.
    pub lent_balance_id: Option<BalanceId>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Account {
    /// Create an account record with only its main balance attached.
    pub fn new(
        id: AccountId,
        asset_id: AssetId,
        super_account_id: Option<AccountId>,
        balance_id: BalanceId,
    ) -> Self {
        Self {
            id,
            asset_id,
            disabled: false,
            super_account_id,
            balance_id,
            trustline_balance_id: None,
            borrowed_balance_id: None,
            credit_extended_balance_id: None,
            lent_balance_id: None,
            created_at: now(),
        }
    }

    /// Check whether this account has no parent.
    pub fn is_root(&self) -> bool {
        self.super_account_id.is_none()
    }

    /// Check whether the child-side credit balances exist.
    pub fn has_trustline(&self) -> bool {
        self.trustline_balance_id.is_some() && self.borrowed_balance_id.is_some()
    }

    /// Check whether the parent-side credit balances exist.
    pub fn has_credit_extended(&self) -> bool {
        self.credit_extended_balance_id.is_some() && self.lent_balance_id.is_some()
    }
}

/// Parameters for `create_account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Caller-chosen id; a fresh time-ordered id is generated if absent.
    pub id: Option<AccountId>,
    /// Asset code, e.g. `"USD"`.
    pub asset_code: String,
    /// Asset scale, e.g. `2` for cents.
    pub asset_scale: u8,
    /// Parent account for a sub-account.
    pub super_account_id: Option<AccountId>,
}

impl CreateAccountRequest {
    /// Request a root account in the given asset.
    pub fn new(asset_code: impl Into<String>, asset_scale: u8) -> Self {
        Self {
            id: None,
            asset_code: asset_code.into(),
            asset_scale,
            super_account_id: None,
        }
    }

    /// Attach a caller-chosen id.
    pub fn with_id(mut self, id: AccountId) -> Self {
        self.id = Some(id);
        self
    }

    /// Create the account under a parent.
    pub fn with_super_account(mut self, super_account_id: AccountId) -> Self {
        self.super_account_id = Some(super_account_id);
        self
    }
}

/// Point-in-time view of an account's five balances.
///
/// Positions that have no backing balance yet read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Real value held.
    pub balance: Amount,
    /// Unused credit available from the parent.
    pub available_credit: Amount,
    /// Credit granted to children, not yet utilized.
    pub credit_extended: Amount,
    /// Debt owed to the parent.
    pub total_borrowed: Amount,
    /// Aggregate amount loaned to children.
    pub total_lent: Amount,
}
