//! Trellis Accounts
//!
//! The account layer of the node: hierarchical multi-asset accounts over
//! the balance ledger. It owns the asset registry, routes transfers and
//! external deposits and withdrawals through per-asset service balances,
//! and runs the credit engine across the account hierarchy.

pub mod account;
pub mod config;
pub mod credit;
pub mod error;
pub mod funding;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod transfer;

pub use account::{Account, BalanceSnapshot, CreateAccountRequest};
pub use config::AccountingConfig;
pub use error::{
    CreateAccountError, CreditError, DepositError, LedgerInconsistency, QueryError, TransferError,
    WithdrawalError,
};
pub use funding::WithdrawalKind;
pub use manager::AccountManager;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use registry::{Asset, AssetRegistry};
pub use transfer::Transaction;
