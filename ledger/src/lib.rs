//! Trellis Ledger Engine
//!
//! Double-entry balance store with linked batches and two-phase transfers.

pub mod balance;
pub mod error;
pub mod memory;
pub mod store;
pub mod transfer;

pub use balance::{Balance, BalanceKind, BalanceSpec, BalanceViolation};
pub use error::{LedgerError, LedgerResult};
pub use memory::{LedgerConfig, MemoryLedger};
pub use store::BalanceStore;
pub use transfer::{TransferBatch, TransferMode, TransferRecord, TransferSpec, TransferState};
