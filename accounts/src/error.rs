//! Account-level error types.
//!
//! Every operation returns its own enum so callers match on exactly the
//! outcomes that operation can produce. Store failures that a correctly
//! maintained ledger can never produce surface as `Inconsistent`, kept
//! apart from business outcomes.

use thiserror::Error;
use trellis_common::{AccountId, AssetCode, AssetId};
use trellis_ledger::LedgerError;

/// The metadata store and the balance ledger disagree.
///
/// Raised when a balance, transfer, or asset an account record points
/// at is missing or in an impossible state. Not caller-recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerInconsistency {
    /// The store rejected a batch every record said was valid.
    #[error("Ledger inconsistency: {0}")]
    Store(LedgerError),

    /// An account references an asset the registry has no record of.
    #[error("Ledger inconsistency: no asset record for {0}")]
    MissingAsset(AssetId),

    /// The hierarchy references an account record that is missing or
    /// missing balances it must have.
    #[error("Ledger inconsistency: account record {0} missing or incomplete")]
    MissingAccount(AccountId),
}

impl From<LedgerError> for LedgerInconsistency {
    fn from(error: LedgerError) -> Self {
        Self::Store(error)
    }
}

/// Errors from `create_account`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateAccountError {
    /// The requested super-account does not exist.
    #[error("Unknown super-account")]
    UnknownSuperAccount,

    /// Malformed asset code, out-of-range scale, or an asset that does
    /// not match the super-account's.
    #[error("Invalid asset")]
    InvalidAsset,

    /// The caller-supplied account id is already taken.
    #[error("Duplicate account id")]
    DuplicateAccountId,

    /// Metadata and ledger diverged.
    #[error(transparent)]
    Inconsistent(#[from] LedgerInconsistency),
}

/// Errors from `transfer` and `Transaction::{commit, rollback}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Source and destination are the same account.
    #[error("Source and destination accounts are the same")]
    SameAccounts,

    /// Zero source amount.
    #[error("Invalid source amount")]
    InvalidSourceAmount,

    /// Zero destination amount, or none given for a cross-asset transfer.
    #[error("Invalid destination amount")]
    InvalidDestinationAmount,

    /// Source account does not exist.
    #[error("Unknown source account")]
    UnknownSourceAccount,

    /// Destination account does not exist.
    #[error("Unknown destination account")]
    UnknownDestinationAccount,

    /// An account's balance cannot cover its leg.
    #[error("Insufficient balance on account {account}")]
    InsufficientBalance { account: AccountId },

    /// An asset's liquidity pool cannot cover its leg.
    #[error("Insufficient liquidity for asset {asset}")]
    InsufficientLiquidity { asset: AssetCode },

    /// The transaction was already committed.
    #[error("Transfer already committed")]
    TransferAlreadyCommitted,

    /// The transaction was already rolled back.
    #[error("Transfer already rejected")]
    TransferAlreadyRejected,

    /// The reservation lapsed before commit or rollback.
    #[error("Transfer expired")]
    TransferExpired,

    /// Metadata and ledger diverged.
    #[error(transparent)]
    Inconsistent(#[from] LedgerInconsistency),
}

/// Errors from the four credit-engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditError {
    /// `account_id` and `sub_account_id` are the same account.
    #[error("Account and sub-account are the same")]
    SameAccounts,

    /// The sub-account does not exist.
    #[error("Unknown account")]
    UnknownAccount,

    /// The sub-account has no super-account.
    #[error("Unknown super-account")]
    UnknownSuperAccount,

    /// `account_id` is not an ancestor of `sub_account_id`.
    #[error("Unrelated sub-account")]
    UnrelatedSubAccount,

    /// A real-value leg cannot be funded.
    #[error("Insufficient balance on account {account}")]
    InsufficientBalance { account: AccountId },

    /// A trustline holds less unused credit than requested.
    #[error("Insufficient credit for account {account}")]
    InsufficientCredit { account: AccountId },

    /// Outstanding debt is smaller than the requested settlement.
    #[error("Insufficient debt for account {account}")]
    InsufficientDebt { account: AccountId },

    /// Metadata and ledger diverged.
    #[error(transparent)]
    Inconsistent(#[from] LedgerInconsistency),
}

/// Errors from `deposit` and `deposit_liquidity`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DepositError {
    /// The caller-supplied id is not a UUID.
    #[error("Invalid deposit id")]
    InvalidId,

    /// Zero amount.
    #[error("Invalid deposit amount")]
    InvalidAmount,

    /// The deposit id was already used.
    #[error("Deposit already exists")]
    DepositExists,

    /// The account does not exist.
    #[error("Unknown account")]
    UnknownAccount,

    /// Malformed asset code or out-of-range scale.
    #[error("Invalid asset")]
    InvalidAsset,

    /// Metadata and ledger diverged.
    #[error(transparent)]
    Inconsistent(#[from] LedgerInconsistency),
}

/// Errors from withdrawal creation and resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawalError {
    /// The caller-supplied id is not a UUID.
    #[error("Invalid withdrawal id")]
    InvalidId,

    /// Zero amount.
    #[error("Invalid withdrawal amount")]
    InvalidAmount,

    /// The withdrawal id was already used.
    #[error("Withdrawal already exists")]
    WithdrawalExists,

    /// The account does not exist.
    #[error("Unknown account")]
    UnknownAccount,

    /// The asset was never created.
    #[error("Unknown asset")]
    UnknownAsset,

    /// No withdrawal was ever created under this id.
    #[error("Unknown withdrawal")]
    UnknownWithdrawal,

    /// The account balance cannot cover the withdrawal.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// The withdrawal exceeds what entered through settlement.
    #[error("Insufficient settlement balance")]
    InsufficientSettlementBalance,

    /// The liquidity pool cannot cover the withdrawal.
    #[error("Insufficient liquidity")]
    InsufficientLiquidity,

    /// The withdrawal was already finalized.
    #[error("Withdrawal already finalized")]
    AlreadyFinalized,

    /// The withdrawal was already rolled back.
    #[error("Withdrawal already rolled back")]
    AlreadyRolledBack,

    /// The withdrawal reservation lapsed.
    #[error("Withdrawal expired")]
    Expired,

    /// Metadata and ledger diverged.
    #[error(transparent)]
    Inconsistent(#[from] LedgerInconsistency),
}

/// Errors from read-only queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The account does not exist.
    #[error("Unknown account")]
    UnknownAccount,

    /// The asset was never created.
    #[error("Unknown asset")]
    UnknownAsset,

    /// Metadata and ledger diverged.
    #[error(transparent)]
    Inconsistent(#[from] LedgerInconsistency),
}
