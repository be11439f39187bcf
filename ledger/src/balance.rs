//! Balance records and constraint arithmetic.
//!
//! A balance never stores a single signed number. It accumulates four
//! non-negative counters (accepted and reserved, debit and credit side)
//! and derives its net position from them, so history is never erased
//! and a reservation can be released without touching accepted totals.

use serde::{Deserialize, Serialize};
use trellis_common::{now, Amount, BalanceId, Timestamp};

/// Which side of a balance is constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    /// Debits must not exceed credits: the balance holds value that can be
    /// spent down to zero. Account balances, trustlines, borrowed balances,
    /// and liquidity pools are held value.
    HeldValue,
    /// Credits must not exceed debits: the balance tracks obligations handed
    /// out, repayable down to zero. Credit-extended, lent, and settlement
    /// balances are obligations.
    Obligation,
}

/// A counter mutation that would break a balance invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceViolation {
    /// A debit would push accepted plus reserved debits past the credits.
    ExceedsCredits,
    /// A credit would push accepted plus reserved credits past the debits.
    ExceedsDebits,
    /// A counter would leave the u64 range.
    Overflow,
}

/// Creation parameters for one balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSpec {
    /// Caller-chosen, globally unique id.
    pub id: BalanceId,
    /// Dense integer identifying the (code, scale) asset pairing.
    pub asset_unit: u16,
    /// Constraint direction.
    pub kind: BalanceKind,
}

impl BalanceSpec {
    /// Create a new balance spec.
    pub fn new(id: BalanceId, asset_unit: u16, kind: BalanceKind) -> Self {
        Self {
            id,
            asset_unit,
            kind,
        }
    }
}

/// The atomic ledger unit.
///
/// Created once, mutated only through transfers, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance id.
    pub id: BalanceId,
    /// Dense asset unit shared with the owning asset.
    pub asset_unit: u16,
    /// Constraint direction.
    pub kind: BalanceKind,
    /// Total debits applied.
    pub debits_accepted: Amount,
    /// Debits held by pending two-phase transfers.
    pub debits_reserved: Amount,
    /// Total credits applied.
    pub credits_accepted: Amount,
    /// Credits held by pending two-phase transfers.
    pub credits_reserved: Amount,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl Balance {
    /// Create a zeroed balance from its spec.
    pub fn new(spec: &BalanceSpec) -> Self {
        let created = now();
        Self {
            id: spec.id,
            asset_unit: spec.asset_unit,
            kind: spec.kind,
            debits_accepted: 0,
            debits_reserved: 0,
            credits_accepted: 0,
            credits_reserved: 0,
            created_at: created,
            updated_at: created,
        }
    }

    /// Net value held. Meaningful for `HeldValue` balances.
    pub fn net_credit(&self) -> Amount {
        self.credits_accepted.saturating_sub(self.debits_accepted)
    }

    /// Net obligation outstanding. Meaningful for `Obligation` balances.
    pub fn net_debit(&self) -> Amount {
        self.debits_accepted.saturating_sub(self.credits_accepted)
    }

    /// Apply a single-phase debit.
    pub fn post_debit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        let accepted = self
            .debits_accepted
            .checked_add(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.check_debit_side(accepted, self.debits_reserved)?;
        self.debits_accepted = accepted;
        self.touch();
        Ok(())
    }

    /// Hold a debit for a pending two-phase transfer.
    pub fn reserve_debit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        let reserved = self
            .debits_reserved
            .checked_add(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.check_debit_side(self.debits_accepted, reserved)?;
        self.debits_reserved = reserved;
        self.touch();
        Ok(())
    }

    /// Move a reserved debit into the accepted counter.
    ///
    /// Never re-checks the constraint: the reserved amount already counted
    /// against it, and the constrained sum is unchanged by the move.
    pub fn commit_debit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        let reserved = self
            .debits_reserved
            .checked_sub(amount)
            .ok_or(BalanceViolation::Overflow)?;
        let accepted = self
            .debits_accepted
            .checked_add(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.debits_reserved = reserved;
        self.debits_accepted = accepted;
        self.touch();
        Ok(())
    }

    /// Release a reserved debit without accepting it.
    pub fn release_debit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        self.debits_reserved = self
            .debits_reserved
            .checked_sub(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.touch();
        Ok(())
    }

    /// Apply a single-phase credit.
    pub fn post_credit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        let accepted = self
            .credits_accepted
            .checked_add(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.check_credit_side(accepted, self.credits_reserved)?;
        self.credits_accepted = accepted;
        self.touch();
        Ok(())
    }

    /// Hold a credit for a pending two-phase transfer.
    pub fn reserve_credit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        let reserved = self
            .credits_reserved
            .checked_add(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.check_credit_side(self.credits_accepted, reserved)?;
        self.credits_reserved = reserved;
        self.touch();
        Ok(())
    }

    /// Move a reserved credit into the accepted counter.
    pub fn commit_credit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        let reserved = self
            .credits_reserved
            .checked_sub(amount)
            .ok_or(BalanceViolation::Overflow)?;
        let accepted = self
            .credits_accepted
            .checked_add(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.credits_reserved = reserved;
        self.credits_accepted = accepted;
        self.touch();
        Ok(())
    }

    /// Release a reserved credit without accepting it.
    pub fn release_credit(&mut self, amount: Amount) -> Result<(), BalanceViolation> {
        self.credits_reserved = self
            .credits_reserved
            .checked_sub(amount)
            .ok_or(BalanceViolation::Overflow)?;
        self.touch();
        Ok(())
    }

    fn check_debit_side(
        &self,
        accepted: Amount,
        reserved: Amount,
    ) -> Result<(), BalanceViolation> {
        if self.kind != BalanceKind::HeldValue {
            return Ok(());
        }
        let total = accepted
            .checked_add(reserved)
            .ok_or(BalanceViolation::Overflow)?;
        if total > self.credits_accepted {
            return Err(BalanceViolation::ExceedsCredits);
        }
        Ok(())
    }

    fn check_credit_side(
        &self,
        accepted: Amount,
        reserved: Amount,
    ) -> Result<(), BalanceViolation> {
        if self.kind != BalanceKind::Obligation {
            return Ok(());
        }
        let total = accepted
            .checked_add(reserved)
            .ok_or(BalanceViolation::Overflow)?;
        if total > self.debits_accepted {
            return Err(BalanceViolation::ExceedsDebits);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}
