//! The persistence seams of the ledger.
//!
//! Accounts and lots are only ever changed together through [`LedgerStore::commit`];
//! the single-row methods exist for administration and tests.

use crate::DbError;
use async_trait::async_trait;
use core_types::{Account, Lot, NewLogEntry, NewLot, TransactionLogEntry};
use rust_decimal::Decimal;
use uuid::Uuid;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: Uuid) -> Result<Account, DbError>;

    /// Opens an account holding `starting_balance` in cash.
    async fn create_account(
        &self,
        user_id: Uuid,
        starting_balance: Decimal,
    ) -> Result<Account, DbError>;

    async fn update_balance(&self, user_id: Uuid, new_cash: Decimal) -> Result<(), DbError>;
}

#[async_trait]
pub trait LotStore: Send + Sync {
    /// Open lots of one symbol in FIFO order: `acquired_at` ascending, then `seq`.
    async fn list_open_lots(&self, user_id: Uuid, symbol: &str) -> Result<Vec<Lot>, DbError>;

    /// Every open lot of the user in FIFO order.
    async fn list_all_open_lots(&self, user_id: Uuid) -> Result<Vec<Lot>, DbError>;

    async fn create_lot(&self, lot: NewLot) -> Result<Lot, DbError>;

    async fn update_lot_quantity(&self, lot_id: Uuid, new_quantity: Decimal)
    -> Result<(), DbError>;

    async fn delete_lot(&self, lot_id: Uuid) -> Result<(), DbError>;
}

/// Append-only record of executed trades.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> Result<TransactionLogEntry, DbError>;

    /// Entries of one user, oldest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<TransactionLogEntry>, DbError>;
}

/// A store that can apply an account update and a batch of lot changes as one unit.
#[async_trait]
pub trait LedgerStore: AccountStore + LotStore {
    /// Applies every change in `commit` or none of them.
    async fn commit(&self, commit: LedgerCommit) -> Result<(), DbError>;
}

/// One change to a user's lots inside a [`LedgerCommit`].
#[derive(Debug, Clone, PartialEq)]
pub enum LotChange {
    Create(NewLot),
    /// Partially consume a lot. Applies only if the lot still holds `from`.
    Reduce { lot_id: Uuid, from: Decimal, to: Decimal },
    /// Fully consume a lot. Applies only if the lot still holds `quantity`.
    Delete { lot_id: Uuid, quantity: Decimal },
}

/// The complete state transition of one trade.
///
/// The account write is guarded by `prior_cash`, so a commit computed from a
/// stale read is refused with [`DbError::Conflict`] instead of overwriting.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCommit {
    pub user_id: Uuid,
    pub prior_cash: Decimal,
    pub new_cash: Decimal,
    pub lot_changes: Vec<LotChange>,
}

impl LedgerCommit {
    /// Checks the invariants that must hold after the commit applies.
    pub fn check_invariants(&self) -> Result<(), DbError> {
        if self.new_cash.is_sign_negative() {
            return Err(DbError::InvariantViolation(format!(
                "cash balance of user {} would become {}",
                self.user_id, self.new_cash
            )));
        }
        for change in &self.lot_changes {
            match change {
                LotChange::Create(lot) => {
                    if lot.user_id != self.user_id {
                        return Err(DbError::InvariantViolation(format!(
                            "lot {} belongs to another user",
                            lot.lot_id
                        )));
                    }
                    if lot.quantity <= Decimal::ZERO || lot.unit_cost.is_sign_negative() {
                        return Err(DbError::InvariantViolation(format!(
                            "lot {} created with quantity {} at cost {}",
                            lot.lot_id, lot.quantity, lot.unit_cost
                        )));
                    }
                }
                LotChange::Reduce { lot_id, from, to } => {
                    if *to <= Decimal::ZERO || to >= from {
                        return Err(DbError::InvariantViolation(format!(
                            "lot {} cannot be reduced from {} to {}",
                            lot_id, from, to
                        )));
                    }
                }
                LotChange::Delete { .. } => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn commit(new_cash: Decimal, lot_changes: Vec<LotChange>) -> LedgerCommit {
        LedgerCommit {
            user_id: Uuid::nil(),
            prior_cash: dec!(100),
            new_cash,
            lot_changes,
        }
    }

    #[test]
    fn test_negative_cash_is_rejected() {
        assert!(commit(dec!(-0.01), vec![]).check_invariants().is_err());
        assert!(commit(dec!(0), vec![]).check_invariants().is_ok());
    }

    #[test]
    fn test_reduce_must_leave_a_positive_remainder() {
        let lot_id = Uuid::new_v4();
        let to_zero = LotChange::Reduce { lot_id, from: dec!(5), to: dec!(0) };
        let growing = LotChange::Reduce { lot_id, from: dec!(5), to: dec!(6) };
        let shrinking = LotChange::Reduce { lot_id, from: dec!(5), to: dec!(3) };
        assert!(commit(dec!(1), vec![to_zero]).check_invariants().is_err());
        assert!(commit(dec!(1), vec![growing]).check_invariants().is_err());
        assert!(commit(dec!(1), vec![shrinking]).check_invariants().is_ok());
    }

    #[test]
    fn test_created_lot_must_belong_to_the_committing_user() {
        let lot = NewLot {
            lot_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            quantity: dec!(1),
            unit_cost: dec!(10),
            acquired_at: Utc::now(),
        };
        assert!(commit(dec!(90), vec![LotChange::Create(lot)]).check_invariants().is_err());
    }
}
