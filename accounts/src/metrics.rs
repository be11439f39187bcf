//! Metrics collection for accounting operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Accounting metrics.
pub struct Metrics {
    /// Accounts created.
    pub accounts_created: AtomicU64,
    /// Transfers initiated.
    pub transfers_initiated: AtomicU64,
    /// Transfers committed.
    pub transfers_committed: AtomicU64,
    /// Transfers rolled back.
    pub transfers_rolled_back: AtomicU64,
    /// Transfers that expired before resolution.
    pub transfers_expired: AtomicU64,
    /// Deposits applied.
    pub deposits_total: AtomicU64,
    /// Withdrawals created.
    pub withdrawals_created: AtomicU64,
    /// Withdrawals finalized.
    pub withdrawals_finalized: AtomicU64,
    /// Withdrawals rolled back.
    pub withdrawals_rolled_back: AtomicU64,
    /// Withdrawals awaiting resolution.
    pub withdrawals_pending: AtomicU64,
    /// Credit extensions applied.
    pub credit_extensions: AtomicU64,
    /// Credit utilizations applied.
    pub credit_utilizations: AtomicU64,
    /// Credit revocations applied.
    pub credit_revocations: AtomicU64,
    /// Debt settlements applied.
    pub debt_settlements: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            accounts_created: AtomicU64::new(0),
            transfers_initiated: AtomicU64::new(0),
            transfers_committed: AtomicU64::new(0),
            transfers_rolled_back: AtomicU64::new(0),
            transfers_expired: AtomicU64::new(0),
            deposits_total: AtomicU64::new(0),
            withdrawals_created: AtomicU64::new(0),
            withdrawals_finalized: AtomicU64::new(0),
            withdrawals_rolled_back: AtomicU64::new(0),
            withdrawals_pending: AtomicU64::new(0),
            credit_extensions: AtomicU64::new(0),
            credit_utilizations: AtomicU64::new(0),
            credit_revocations: AtomicU64::new(0),
            debt_settlements: AtomicU64::new(0),
        }
    }

    /// Record an account creation.
    pub fn account_created(&self) {
        self.accounts_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transfer reservation.
    pub fn transfer_initiated(&self) {
        self.transfers_initiated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transfer commit.
    pub fn transfer_committed(&self) {
        self.transfers_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transfer rollback.
    pub fn transfer_rolled_back(&self) {
        self.transfers_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transfer found expired at resolution time.
    pub fn transfer_expired(&self) {
        self.transfers_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a deposit.
    pub fn deposit_applied(&self) {
        self.deposits_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a withdrawal reservation.
    pub fn withdrawal_created(&self) {
        self.withdrawals_created.fetch_add(1, Ordering::Relaxed);
        self.withdrawals_pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a withdrawal finalization.
    pub fn withdrawal_finalized(&self) {
        self.withdrawals_finalized.fetch_add(1, Ordering::Relaxed);
        self.withdrawals_pending.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a withdrawal rollback.
    pub fn withdrawal_rolled_back(&self) {
        self.withdrawals_rolled_back.fetch_add(1, Ordering::Relaxed);
        self.withdrawals_pending.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a credit extension.
    pub fn credit_extended(&self) {
        self.credit_extensions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a credit utilization.
    pub fn credit_utilized(&self) {
        self.credit_utilizations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a credit revocation.
    pub fn credit_revoked(&self) {
        self.credit_revocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a debt settlement.
    pub fn debt_settled(&self) {
        self.debt_settlements.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accounts_created: self.accounts_created.load(Ordering::Relaxed),
            transfers_initiated: self.transfers_initiated.load(Ordering::Relaxed),
            transfers_committed: self.transfers_committed.load(Ordering::Relaxed),
            transfers_rolled_back: self.transfers_rolled_back.load(Ordering::Relaxed),
            transfers_expired: self.transfers_expired.load(Ordering::Relaxed),
            deposits_total: self.deposits_total.load(Ordering::Relaxed),
            withdrawals_created: self.withdrawals_created.load(Ordering::Relaxed),
            withdrawals_finalized: self.withdrawals_finalized.load(Ordering::Relaxed),
            withdrawals_rolled_back: self.withdrawals_rolled_back.load(Ordering::Relaxed),
            withdrawals_pending: self.withdrawals_pending.load(Ordering::Relaxed),
            credit_extensions: self.credit_extensions.load(Ordering::Relaxed),
            credit_utilizations: self.credit_utilizations.load(Ordering::Relaxed),
            credit_revocations: self.credit_revocations.load(Ordering::Relaxed),
            debt_settlements: self.debt_settlements.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP trellis_accounts_created Total accounts created
# TYPE trellis_accounts_created counter
trellis_accounts_created {}

# HELP trellis_transfers_initiated Total transfers initiated
# TYPE trellis_transfers_initiated counter
trellis_transfers_initiated {}

# HELP trellis_transfers_committed Total transfers committed
# TYPE trellis_transfers_committed counter
trellis_transfers_committed {}

# HELP trellis_transfers_rolled_back Total transfers rolled back
# TYPE trellis_transfers_rolled_back counter
trellis_transfers_rolled_back {}

# HELP trellis_transfers_expired Total transfers expired before resolution
# TYPE trellis_transfers_expired counter
trellis_transfers_expired {}

# HELP trellis_deposits_total Total deposits applied
# TYPE trellis_deposits_total counter
trellis_deposits_total {}

# HELP trellis_withdrawals_created Total withdrawals created
# TYPE trellis_withdrawals_created counter
trellis_withdrawals_created {}

# HELP trellis_withdrawals_finalized Total withdrawals finalized
# TYPE trellis_withdrawals_finalized counter
trellis_withdrawals_finalized {}

# HELP trellis_withdrawals_rolled_back Total withdrawals rolled back
# TYPE trellis_withdrawals_rolled_back counter
trellis_withdrawals_rolled_back {}

# HELP trellis_withdrawals_pending Current withdrawals awaiting resolution
# TYPE trellis_withdrawals_pending gauge
trellis_withdrawals_pending {}

# HELP trellis_credit_extensions Total credit extensions
# TYPE trellis_credit_extensions counter
trellis_credit_extensions {}

# HELP trellis_credit_utilizations Total credit utilizations
# TYPE trellis_credit_utilizations counter
trellis_credit_utilizations {}

# HELP trellis_credit_revocations Total credit revocations
# TYPE trellis_credit_revocations counter
trellis_credit_revocations {}

# HELP trellis_debt_settlements Total debt settlements
# TYPE trellis_debt_settlements counter
trellis_debt_settlements {}
"#,
            snapshot.accounts_created,
            snapshot.transfers_initiated,
            snapshot.transfers_committed,
            snapshot.transfers_rolled_back,
            snapshot.transfers_expired,
            snapshot.deposits_total,
            snapshot.withdrawals_created,
            snapshot.withdrawals_finalized,
            snapshot.withdrawals_rolled_back,
            snapshot.withdrawals_pending,
            snapshot.credit_extensions,
            snapshot.credit_utilizations,
            snapshot.credit_revocations,
            snapshot.debt_settlements,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub accounts_created: u64,
    pub transfers_initiated: u64,
    pub transfers_committed: u64,
    pub transfers_rolled_back: u64,
    pub transfers_expired: u64,
    pub deposits_total: u64,
    pub withdrawals_created: u64,
    pub withdrawals_finalized: u64,
    pub withdrawals_rolled_back: u64,
    pub withdrawals_pending: u64,
    pub credit_extensions: u64,
    pub credit_utilizations: u64,
    pub credit_revocations: u64,
    pub debt_settlements: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.withdrawal_created();
        metrics.withdrawal_created();
        metrics.withdrawal_finalized();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.withdrawals_created, 2);
        assert_eq!(snapshot.withdrawals_finalized, 1);
        assert_eq!(snapshot.withdrawals_pending, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.deposit_applied();

        let output = metrics.to_prometheus();
        assert!(output.contains("trellis_deposits_total 1"));
    }
}
