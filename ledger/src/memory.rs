//! In-memory balance store.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use trellis_common::{constants, now, BalanceId, DurationExt, Timestamp, TransferId};

use crate::balance::{Balance, BalanceSpec, BalanceViolation};
use crate::error::{LedgerError, LedgerResult};
use crate::store::BalanceStore;
use crate::transfer::{TransferBatch, TransferMode, TransferRecord, TransferSpec, TransferState};

/// Configuration for the in-memory store.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How often the background sweep looks for lapsed reservations.
    pub expiry_sweep_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval: constants::expiry_sweep_interval(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("TRELLIS_EXPIRY_SWEEP_MS") {
            if let Ok(ms) = ms.parse() {
                config.expiry_sweep_interval = Duration::milliseconds(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.expiry_sweep_interval <= Duration::zero() {
            return Err("Expiry sweep interval must be positive".to_string());
        }

        Ok(())
    }
}

/// Everything the store knows, guarded by one lock.
struct Book {
    balances: HashMap<BalanceId, Balance>,
    transfers: HashMap<TransferId, TransferRecord>,
    /// Pending reservations ordered by deadline.
    deadlines: BTreeSet<(Timestamp, TransferId)>,
}

impl Book {
    fn new() -> Self {
        Self {
            balances: HashMap::new(),
            transfers: HashMap::new(),
            deadlines: BTreeSet::new(),
        }
    }
}

/// Reference [`BalanceStore`] backend.
///
/// Writers serialize behind a single `RwLock`, which makes every batch
/// a serializable atomic unit without per-balance locking. Reservations
/// past their deadline are expired at the start of every mutating call
/// and by the background sweep, whichever runs first.
pub struct MemoryLedger {
    book: RwLock<Book>,
    config: LedgerConfig,
}

impl MemoryLedger {
    /// Create a store with default configuration.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Create a store with the given configuration.
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            book: RwLock::new(Book::new()),
            config,
        }
    }

    /// Expire every reservation whose deadline has passed.
    ///
    /// Returns the number of transfers expired. Mutating calls run this
    /// implicitly, so it only needs to be called directly by the sweep
    /// loop or by tests.
    pub fn sweep_expired(&self) -> usize {
        let mut guard = self.book.write();
        Self::expire_due(&mut guard, now())
    }

    /// Run the background expiry sweep until the task is dropped.
    pub async fn run_expiry_loop(&self) {
        let interval = self.config.expiry_sweep_interval.as_std();
        loop {
            tokio::time::sleep(interval).await;
            let expired = self.sweep_expired();
            if expired > 0 {
                debug!(count = expired, "Expired lapsed reservations");
            }
        }
    }

    /// Number of balances created.
    pub fn balance_count(&self) -> usize {
        self.book.read().balances.len()
    }

    /// Number of transfers still pending.
    pub fn pending_transfer_count(&self) -> usize {
        self.book
            .read()
            .transfers
            .values()
            .filter(|record| record.state == TransferState::Pending)
            .count()
    }

    /// Lifecycle state of a transfer, if it was ever applied.
    pub fn transfer_state(&self, id: TransferId) -> Option<TransferState> {
        self.book.read().transfers.get(&id).map(|record| record.state)
    }

    fn expire_due(book: &mut Book, at: Timestamp) -> usize {
        let due: Vec<(Timestamp, TransferId)> = book
            .deadlines
            .iter()
            .take_while(|(deadline, _)| *deadline <= at)
            .copied()
            .collect();

        for (deadline, id) in &due {
            book.deadlines.remove(&(*deadline, *id));
            let spec = match book.transfers.get_mut(id) {
                Some(record) if record.state == TransferState::Pending => {
                    record.state = TransferState::Expired;
                    record.spec.clone()
                }
                _ => continue,
            };
            Self::release_reservation(&mut book.balances, &spec);
            warn!(transfer_id = %id, "Reservation expired");
        }

        due.len()
    }

    /// Hand reserved amounts back after an expiry.
    ///
    /// Balances are never deleted and a pending record always holds its
    /// reservation, so failures here mean the book is corrupt. The sweep
    /// has no caller to report to, so it logs and moves on.
    fn release_reservation(balances: &mut HashMap<BalanceId, Balance>, spec: &TransferSpec) {
        match balances.get_mut(&spec.source) {
            Some(balance) => {
                if balance.release_debit(spec.amount).is_err() {
                    error!(balance_id = %spec.source, "Reserved debit missing during expiry");
                }
            }
            None => error!(balance_id = %spec.source, "Balance missing during expiry"),
        }
        match balances.get_mut(&spec.destination) {
            Some(balance) => {
                if balance.release_credit(spec.amount).is_err() {
                    error!(balance_id = %spec.destination, "Reserved credit missing during expiry");
                }
            }
            None => error!(balance_id = %spec.destination, "Balance missing during expiry"),
        }
    }

    /// Working copy of a balance, cloned from the book on first touch.
    fn fetch_scratch<'a>(
        scratch: &'a mut HashMap<BalanceId, Balance>,
        balances: &HashMap<BalanceId, Balance>,
        id: BalanceId,
    ) -> LedgerResult<&'a mut Balance> {
        match scratch.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => match balances.get(&id) {
                Some(balance) => Ok(entry.insert(balance.clone())),
                None => Err(LedgerError::BalanceNotFound { id }),
            },
        }
    }

    fn violation_error(index: usize, balance: BalanceId, violation: BalanceViolation) -> LedgerError {
        match violation {
            BalanceViolation::ExceedsCredits => LedgerError::ExceedsCredits { index, balance },
            BalanceViolation::ExceedsDebits => LedgerError::ExceedsDebits { index, balance },
            BalanceViolation::Overflow => LedgerError::AmountOverflow { index, balance },
        }
    }

    /// Validate the states of `ids`, dropping duplicates, and return the
    /// specs to act on. Duplicate ids within one call collapse to a
    /// single commit or release.
    fn eligible_pending(
        book: &Book,
        ids: &[TransferId],
    ) -> LedgerResult<Vec<(TransferSpec, Option<Timestamp>)>> {
        let mut seen = HashSet::new();
        let mut eligible = Vec::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let record = book
                .transfers
                .get(id)
                .ok_or(LedgerError::TransferNotFound { id: *id })?;
            match record.state {
                TransferState::Pending => {}
                TransferState::Committed => {
                    return Err(LedgerError::TransferAlreadyCommitted { id: *id })
                }
                TransferState::RolledBack => {
                    return Err(LedgerError::TransferAlreadyRolledBack { id: *id })
                }
                TransferState::Expired => return Err(LedgerError::TransferExpired { id: *id }),
            }
            eligible.push((record.spec.clone(), record.expires_at));
        }

        Ok(eligible)
    }

    fn finish_pending(book: &mut Book, spec: &TransferSpec, deadline: Option<Timestamp>, state: TransferState) {
        if let Some(deadline) = deadline {
            book.deadlines.remove(&(deadline, spec.id));
        }
        if let Some(record) = book.transfers.get_mut(&spec.id) {
            record.state = state;
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for MemoryLedger {
    async fn create_balances(&self, specs: &[BalanceSpec]) -> LedgerResult<()> {
        if specs.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut guard = self.book.write();
        let book = &mut *guard;

        let mut seen = HashSet::new();
        for spec in specs {
            if book.balances.contains_key(&spec.id) || !seen.insert(spec.id) {
                return Err(LedgerError::BalanceExists { id: spec.id });
            }
        }

        for spec in specs {
            book.balances.insert(spec.id, Balance::new(spec));
        }

        debug!(count = specs.len(), "Created balances");
        Ok(())
    }

    async fn apply_transfers(&self, batch: &TransferBatch) -> LedgerResult<()> {
        if batch.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut guard = self.book.write();
        let book = &mut *guard;
        Self::expire_due(book, now());

        // Whole-batch validation before any balance is touched.
        let mut seen = HashSet::new();
        for (index, leg) in batch.legs().iter().enumerate() {
            if book.transfers.contains_key(&leg.id) || !seen.insert(leg.id) {
                return Err(LedgerError::TransferExists { id: leg.id });
            }
            if leg.amount == 0 {
                return Err(LedgerError::ZeroAmount { index });
            }
            if leg.source == leg.destination {
                return Err(LedgerError::SameBalance { index });
            }
        }

        // Legs mutate scratch copies in order, so a post-mode credit is
        // visible to later debits while a reservation is not. The book
        // itself stays untouched until every leg has passed.
        let mode = batch.mode();
        let mut scratch: HashMap<BalanceId, Balance> = HashMap::new();
        for (index, leg) in batch.legs().iter().enumerate() {
            let source = Self::fetch_scratch(&mut scratch, &book.balances, leg.source)?;
            match mode {
                TransferMode::Post => source.post_debit(leg.amount),
                TransferMode::Reserve { .. } => source.reserve_debit(leg.amount),
            }
            .map_err(|violation| Self::violation_error(index, leg.source, violation))?;

            let destination = Self::fetch_scratch(&mut scratch, &book.balances, leg.destination)?;
            match mode {
                TransferMode::Post => destination.post_credit(leg.amount),
                TransferMode::Reserve { .. } => destination.reserve_credit(leg.amount),
            }
            .map_err(|violation| Self::violation_error(index, leg.destination, violation))?;
        }

        for (id, balance) in scratch {
            book.balances.insert(id, balance);
        }
        for leg in batch.legs() {
            let record = match mode {
                TransferMode::Post => TransferRecord::committed(leg.clone()),
                TransferMode::Reserve { timeout } => TransferRecord::pending(leg.clone(), timeout),
            };
            if let Some(deadline) = record.expires_at {
                book.deadlines.insert((deadline, record.spec.id));
            }
            book.transfers.insert(record.spec.id, record);
        }

        debug!(legs = batch.len(), mode = ?mode, "Applied transfer batch");
        Ok(())
    }

    async fn commit_transfers(&self, ids: &[TransferId]) -> LedgerResult<()> {
        if ids.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut guard = self.book.write();
        let book = &mut *guard;
        Self::expire_due(book, now());

        let eligible = Self::eligible_pending(book, ids)?;

        let mut scratch: HashMap<BalanceId, Balance> = HashMap::new();
        for (index, (spec, _)) in eligible.iter().enumerate() {
            let source = Self::fetch_scratch(&mut scratch, &book.balances, spec.source)?;
            source
                .commit_debit(spec.amount)
                .map_err(|violation| Self::violation_error(index, spec.source, violation))?;

            let destination = Self::fetch_scratch(&mut scratch, &book.balances, spec.destination)?;
            destination
                .commit_credit(spec.amount)
                .map_err(|violation| Self::violation_error(index, spec.destination, violation))?;
        }

        for (id, balance) in scratch {
            book.balances.insert(id, balance);
        }
        for (spec, deadline) in &eligible {
            Self::finish_pending(book, spec, *deadline, TransferState::Committed);
        }

        debug!(count = eligible.len(), "Committed transfers");
        Ok(())
    }

    async fn rollback_transfers(&self, ids: &[TransferId]) -> LedgerResult<()> {
        if ids.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut guard = self.book.write();
        let book = &mut *guard;
        Self::expire_due(book, now());

        let eligible = Self::eligible_pending(book, ids)?;

        let mut scratch: HashMap<BalanceId, Balance> = HashMap::new();
        for (index, (spec, _)) in eligible.iter().enumerate() {
            let source = Self::fetch_scratch(&mut scratch, &book.balances, spec.source)?;
            source
                .release_debit(spec.amount)
                .map_err(|violation| Self::violation_error(index, spec.source, violation))?;

            let destination = Self::fetch_scratch(&mut scratch, &book.balances, spec.destination)?;
            destination
                .release_credit(spec.amount)
                .map_err(|violation| Self::violation_error(index, spec.destination, violation))?;
        }

        for (id, balance) in scratch {
            book.balances.insert(id, balance);
        }
        for (spec, deadline) in &eligible {
            Self::finish_pending(book, spec, *deadline, TransferState::RolledBack);
        }

        debug!(count = eligible.len(), "Rolled back transfers");
        Ok(())
    }

    async fn read_balances(&self, ids: &[BalanceId]) -> Vec<Balance> {
        let book = self.book.read();
        ids.iter()
            .filter_map(|id| book.balances.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceKind;
    use trellis_common::Amount;

    fn held_spec() -> BalanceSpec {
        BalanceSpec::new(BalanceId::new(), 1, BalanceKind::HeldValue)
    }

    fn obligation_spec() -> BalanceSpec {
        BalanceSpec::new(BalanceId::new(), 1, BalanceKind::Obligation)
    }

    /// An obligation balance funding a held-value balance, the same
    /// shape a settlement balance and an account balance take.
    async fn setup_funded(store: &MemoryLedger, amount: Amount) -> (BalanceId, BalanceId) {
        let settlement = obligation_spec();
        let account = held_spec();
        store
            .create_balances(&[settlement.clone(), account.clone()])
            .await
            .unwrap();
        store
            .apply_transfers(&TransferBatch::single_phase(vec![TransferSpec::new(
                settlement.id,
                account.id,
                amount,
            )]))
            .await
            .unwrap();
        (settlement.id, account.id)
    }

    async fn net_credit(store: &MemoryLedger, id: BalanceId) -> Amount {
        store.read_balances(&[id]).await[0].net_credit()
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_ids() {
        let store = MemoryLedger::new();
        let spec = held_spec();
        store.create_balances(&[spec.clone()]).await.unwrap();

        assert_eq!(
            store.create_balances(&[spec.clone()]).await,
            Err(LedgerError::BalanceExists { id: spec.id })
        );
    }

    #[tokio::test]
    async fn test_create_batch_is_atomic() {
        let store = MemoryLedger::new();
        let fresh = held_spec();
        let dup = held_spec();

        let result = store
            .create_balances(&[fresh.clone(), dup.clone(), dup.clone()])
            .await;

        assert_eq!(result, Err(LedgerError::BalanceExists { id: dup.id }));
        assert_eq!(store.balance_count(), 0);
    }

    #[tokio::test]
    async fn test_post_batch_moves_value() {
        let store = MemoryLedger::new();
        let (settlement, account) = setup_funded(&store, 100).await;

        assert_eq!(net_credit(&store, account).await, 100);
        assert_eq!(store.read_balances(&[settlement]).await[0].net_debit(), 100);
    }

    #[tokio::test]
    async fn test_resubmitted_transfer_id_rejected() {
        let store = MemoryLedger::new();
        let (settlement, account) = setup_funded(&store, 100).await;

        let leg = TransferSpec::new(settlement, account, 10);
        store
            .apply_transfers(&TransferBatch::single_phase(vec![leg.clone()]))
            .await
            .unwrap();

        // Identical resubmission is still a conflict
        assert_eq!(
            store
                .apply_transfers(&TransferBatch::single_phase(vec![leg.clone()]))
                .await,
            Err(LedgerError::TransferExists { id: leg.id })
        );
        assert_eq!(net_credit(&store, account).await, 110);
    }

    #[tokio::test]
    async fn test_duplicate_leg_ids_within_batch_rejected() {
        let store = MemoryLedger::new();
        let (settlement, account) = setup_funded(&store, 100).await;

        let leg = TransferSpec::new(settlement, account, 10);
        let result = store
            .apply_transfers(&TransferBatch::single_phase(vec![leg.clone(), leg.clone()]))
            .await;

        assert_eq!(result, Err(LedgerError::TransferExists { id: leg.id }));
        assert_eq!(net_credit(&store, account).await, 100);
    }

    #[tokio::test]
    async fn test_reserve_then_commit() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let leg = TransferSpec::new(account, other.id, 30);
        store
            .apply_transfers(&TransferBatch::two_phase(vec![leg.clone()], None))
            .await
            .unwrap();

        let held = store.read_balances(&[account]).await[0].clone();
        assert_eq!(held.debits_reserved, 30);
        assert_eq!(held.debits_accepted, 0);
        assert_eq!(store.transfer_state(leg.id), Some(TransferState::Pending));

        store.commit_transfers(&[leg.id]).await.unwrap();

        let held = store.read_balances(&[account]).await[0].clone();
        assert_eq!(held.debits_reserved, 0);
        assert_eq!(held.debits_accepted, 30);
        assert_eq!(net_credit(&store, other.id).await, 30);
        assert_eq!(store.transfer_state(leg.id), Some(TransferState::Committed));
    }

    #[tokio::test]
    async fn test_reserve_then_rollback() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let leg = TransferSpec::new(account, other.id, 30);
        store
            .apply_transfers(&TransferBatch::two_phase(vec![leg.clone()], None))
            .await
            .unwrap();
        store.rollback_transfers(&[leg.id]).await.unwrap();

        let held = store.read_balances(&[account]).await[0].clone();
        assert_eq!(held.debits_reserved, 0);
        assert_eq!(held.debits_accepted, 0);
        assert_eq!(net_credit(&store, other.id).await, 0);
        assert_eq!(
            store.transfer_state(leg.id),
            Some(TransferState::RolledBack)
        );
    }

    #[tokio::test]
    async fn test_failing_leg_rejects_whole_batch() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let first = TransferSpec::new(account, other.id, 60);
        let second = TransferSpec::new(account, other.id, 60);
        let result = store
            .apply_transfers(&TransferBatch::single_phase(vec![
                first.clone(),
                second.clone(),
            ]))
            .await;

        assert_eq!(
            result,
            Err(LedgerError::ExceedsCredits {
                index: 1,
                balance: account
            })
        );
        assert_eq!(net_credit(&store, account).await, 100);
        assert_eq!(net_credit(&store, other.id).await, 0);
        assert_eq!(store.transfer_state(first.id), None);
    }

    #[tokio::test]
    async fn test_post_mode_credits_fund_later_legs() {
        let store = MemoryLedger::new();
        let settlement = obligation_spec();
        let hop = held_spec();
        let sink = held_spec();
        store
            .create_balances(&[settlement.clone(), hop.clone(), sink.clone()])
            .await
            .unwrap();

        // hop starts empty; the first leg funds the second within the batch
        store
            .apply_transfers(&TransferBatch::single_phase(vec![
                TransferSpec::new(settlement.id, hop.id, 100),
                TransferSpec::new(hop.id, sink.id, 40),
            ]))
            .await
            .unwrap();

        assert_eq!(net_credit(&store, hop.id).await, 60);
        assert_eq!(net_credit(&store, sink.id).await, 40);
    }

    #[tokio::test]
    async fn test_reserved_credits_fund_nothing() {
        let store = MemoryLedger::new();
        let settlement = obligation_spec();
        let hop = held_spec();
        let sink = held_spec();
        store
            .create_balances(&[settlement.clone(), hop.clone(), sink.clone()])
            .await
            .unwrap();

        let result = store
            .apply_transfers(&TransferBatch::two_phase(
                vec![
                    TransferSpec::new(settlement.id, hop.id, 100),
                    TransferSpec::new(hop.id, sink.id, 40),
                ],
                None,
            ))
            .await;

        assert_eq!(
            result,
            Err(LedgerError::ExceedsCredits {
                index: 1,
                balance: hop.id
            })
        );
    }

    #[tokio::test]
    async fn test_commit_set_is_all_or_nothing() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let leg = TransferSpec::new(account, other.id, 30);
        store
            .apply_transfers(&TransferBatch::two_phase(vec![leg.clone()], None))
            .await
            .unwrap();

        let unknown = TransferId::new();
        assert_eq!(
            store.commit_transfers(&[leg.id, unknown]).await,
            Err(LedgerError::TransferNotFound { id: unknown })
        );
        assert_eq!(store.transfer_state(leg.id), Some(TransferState::Pending));

        // The untouched reservation can still be committed on its own
        store.commit_transfers(&[leg.id]).await.unwrap();
        assert_eq!(net_credit(&store, other.id).await, 30);
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_commit_collapse() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let leg = TransferSpec::new(account, other.id, 30);
        store
            .apply_transfers(&TransferBatch::two_phase(vec![leg.clone()], None))
            .await
            .unwrap();
        store.commit_transfers(&[leg.id, leg.id]).await.unwrap();

        assert_eq!(net_credit(&store, other.id).await, 30);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_further_resolution() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let committed = TransferSpec::new(account, other.id, 10);
        let rolled_back = TransferSpec::new(account, other.id, 10);
        store
            .apply_transfers(&TransferBatch::two_phase(
                vec![committed.clone(), rolled_back.clone()],
                None,
            ))
            .await
            .unwrap();
        store.commit_transfers(&[committed.id]).await.unwrap();
        store.rollback_transfers(&[rolled_back.id]).await.unwrap();

        assert_eq!(
            store.commit_transfers(&[committed.id]).await,
            Err(LedgerError::TransferAlreadyCommitted { id: committed.id })
        );
        assert_eq!(
            store.rollback_transfers(&[committed.id]).await,
            Err(LedgerError::TransferAlreadyCommitted { id: committed.id })
        );
        assert_eq!(
            store.commit_transfers(&[rolled_back.id]).await,
            Err(LedgerError::TransferAlreadyRolledBack { id: rolled_back.id })
        );
    }

    #[tokio::test]
    async fn test_reservation_expires() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let leg = TransferSpec::new(account, other.id, 30);
        store
            .apply_transfers(&TransferBatch::two_phase(
                vec![leg.clone()],
                Some(Duration::milliseconds(20)),
            ))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        assert_eq!(
            store.commit_transfers(&[leg.id]).await,
            Err(LedgerError::TransferExpired { id: leg.id })
        );
        assert_eq!(store.transfer_state(leg.id), Some(TransferState::Expired));

        let held = store.read_balances(&[account]).await[0].clone();
        assert_eq!(held.debits_reserved, 0);
        assert_eq!(held.debits_accepted, 0);
    }

    #[tokio::test]
    async fn test_sweep_reports_expired_count() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        store
            .apply_transfers(&TransferBatch::two_phase(
                vec![TransferSpec::new(account, other.id, 30)],
                Some(Duration::milliseconds(20)),
            ))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.pending_transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_open_ended_reservation_never_expires() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let other = held_spec();
        store.create_balances(&[other.clone()]).await.unwrap();

        let leg = TransferSpec::new(account, other.id, 30);
        store
            .apply_transfers(&TransferBatch::two_phase(vec![leg.clone()], None))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        assert_eq!(store.sweep_expired(), 0);
        store.commit_transfers(&[leg.id]).await.unwrap();
        assert_eq!(net_credit(&store, other.id).await, 30);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let store = MemoryLedger::new();
        let (settlement, account) = setup_funded(&store, 100).await;

        let result = store
            .apply_transfers(&TransferBatch::single_phase(vec![TransferSpec::new(
                settlement, account, 0,
            )]))
            .await;

        assert_eq!(result, Err(LedgerError::ZeroAmount { index: 0 }));
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;

        let result = store
            .apply_transfers(&TransferBatch::single_phase(vec![TransferSpec::new(
                account, account, 10,
            )]))
            .await;

        assert_eq!(result, Err(LedgerError::SameBalance { index: 0 }));
    }

    #[tokio::test]
    async fn test_unknown_balance_rejected() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;
        let missing = BalanceId::new();

        let result = store
            .apply_transfers(&TransferBatch::single_phase(vec![TransferSpec::new(
                account, missing, 10,
            )]))
            .await;

        assert_eq!(result, Err(LedgerError::BalanceNotFound { id: missing }));
    }

    #[tokio::test]
    async fn test_empty_batches_rejected() {
        let store = MemoryLedger::new();

        assert_eq!(
            store
                .apply_transfers(&TransferBatch::single_phase(vec![]))
                .await,
            Err(LedgerError::EmptyBatch)
        );
        assert_eq!(store.commit_transfers(&[]).await, Err(LedgerError::EmptyBatch));
        assert_eq!(
            store.rollback_transfers(&[]).await,
            Err(LedgerError::EmptyBatch)
        );
    }

    #[tokio::test]
    async fn test_read_skips_unknown_ids() {
        let store = MemoryLedger::new();
        let (_, account) = setup_funded(&store, 100).await;

        let snapshot = store.read_balances(&[account, BalanceId::new()]).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, account);
    }

    #[test]
    fn test_config_validation() {
        assert!(LedgerConfig::default().validate().is_ok());

        let config = LedgerConfig {
            expiry_sweep_interval: Duration::zero(),
        };
        assert!(config.validate().is_err());
    }
}
