//! A process-local ledger with the same atomicity as the Postgres one.
//!
//! Commits are staged on a copy of the state and swapped in only when every
//! change applied, so a failure part way through leaves nothing behind. Faults can
//! be injected to exercise those failure paths.

use crate::DbError;
use crate::store::{AccountStore, LedgerCommit, LedgerStore, LotChange, LotStore, TransactionLog};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Account, Lot, NewLogEntry, NewLot, TransactionLogEntry};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    lots: HashMap<Uuid, Lot>,
    next_lot_seq: i64,
}

impl LedgerState {
    fn fifo_lots<F>(&self, filter: F) -> Vec<Lot>
    where
        F: Fn(&Lot) -> bool,
    {
        let mut lots: Vec<Lot> = self.lots.values().filter(|lot| filter(lot)).cloned().collect();
        lots.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at).then(a.seq.cmp(&b.seq)));
        lots
    }

    fn insert_lot(&mut self, lot: NewLot) -> Lot {
        self.next_lot_seq += 1;
        let lot = lot.into_lot(self.next_lot_seq);
        self.lots.insert(lot.lot_id, lot.clone());
        lot
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    entries: RwLock<Vec<TransactionLogEntry>>,
    failing_lot_writes: AtomicU32,
    failing_log_appends: AtomicU32,
}

/// Consumes one pending fault, if any.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` lot writes inside a commit fail.
    pub fn fail_next_lot_writes(&self, count: u32) {
        self.failing_lot_writes.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` transaction log appends fail.
    pub fn fail_next_log_appends(&self, count: u32) {
        self.failing_log_appends.store(count, Ordering::SeqCst);
    }

    fn lot_write(&self, lot_id: Uuid) -> Result<(), DbError> {
        if take_fault(&self.failing_lot_writes) {
            return Err(DbError::WriteFailed(format!("injected failure writing lot {}", lot_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryLedger {
    async fn get_account(&self, user_id: Uuid) -> Result<Account, DbError> {
        self.state
            .read()
            .await
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or(DbError::AccountNotFound(user_id))
    }

    async fn create_account(
        &self,
        user_id: Uuid,
        starting_balance: Decimal,
    ) -> Result<Account, DbError> {
        if starting_balance.is_sign_negative() {
            return Err(DbError::InvariantViolation(format!(
                "starting balance {} is negative",
                starting_balance
            )));
        }
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&user_id) {
            return Err(DbError::AccountExists(user_id));
        }
        let account = Account {
            user_id,
            cash_balance: starting_balance,
            initial_balance: starting_balance,
            created_at: Utc::now(),
        };
        state.accounts.insert(user_id, account.clone());
        Ok(account)
    }

    async fn update_balance(&self, user_id: Uuid, new_cash: Decimal) -> Result<(), DbError> {
        if new_cash.is_sign_negative() {
            return Err(DbError::InvariantViolation(format!(
                "cash balance of user {} would become {}",
                user_id, new_cash
            )));
        }
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or(DbError::AccountNotFound(user_id))?;
        account.cash_balance = new_cash;
        Ok(())
    }
}

#[async_trait]
impl LotStore for MemoryLedger {
    async fn list_open_lots(&self, user_id: Uuid, symbol: &str) -> Result<Vec<Lot>, DbError> {
        Ok(self
            .state
            .read()
            .await
            .fifo_lots(|lot| lot.user_id == user_id && lot.symbol == symbol))
    }

    async fn list_all_open_lots(&self, user_id: Uuid) -> Result<Vec<Lot>, DbError> {
        Ok(self.state.read().await.fifo_lots(|lot| lot.user_id == user_id))
    }

    async fn create_lot(&self, lot: NewLot) -> Result<Lot, DbError> {
        if lot.quantity <= Decimal::ZERO {
            return Err(DbError::InvariantViolation(format!(
                "lot {} created with quantity {}",
                lot.lot_id, lot.quantity
            )));
        }
        self.lot_write(lot.lot_id)?;
        Ok(self.state.write().await.insert_lot(lot))
    }

    async fn update_lot_quantity(
        &self,
        lot_id: Uuid,
        new_quantity: Decimal,
    ) -> Result<(), DbError> {
        if new_quantity <= Decimal::ZERO {
            return Err(DbError::InvariantViolation(format!(
                "lot {} cannot hold {}; delete it instead",
                lot_id, new_quantity
            )));
        }
        self.lot_write(lot_id)?;
        let mut state = self.state.write().await;
        let lot = state.lots.get_mut(&lot_id).ok_or(DbError::LotNotFound(lot_id))?;
        lot.quantity = new_quantity;
        Ok(())
    }

    async fn delete_lot(&self, lot_id: Uuid) -> Result<(), DbError> {
        self.lot_write(lot_id)?;
        self.state
            .write()
            .await
            .lots
            .remove(&lot_id)
            .map(|_| ())
            .ok_or(DbError::LotNotFound(lot_id))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn commit(&self, commit: LedgerCommit) -> Result<(), DbError> {
        commit.check_invariants()?;
        let mut state = self.state.write().await;
        let mut staged = state.clone();

        let account = staged
            .accounts
            .get_mut(&commit.user_id)
            .ok_or(DbError::AccountNotFound(commit.user_id))?;
        if account.cash_balance != commit.prior_cash {
            return Err(DbError::Conflict(format!(
                "cash balance of user {} is no longer {}",
                commit.user_id, commit.prior_cash
            )));
        }
        account.cash_balance = commit.new_cash;

        for change in commit.lot_changes {
            match change {
                LotChange::Create(lot) => {
                    self.lot_write(lot.lot_id)?;
                    staged.insert_lot(lot);
                }
                LotChange::Reduce { lot_id, from, to } => {
                    self.lot_write(lot_id)?;
                    match staged.lots.get_mut(&lot_id) {
                        Some(lot) if lot.user_id == commit.user_id && lot.quantity == from => {
                            lot.quantity = to;
                        }
                        _ => {
                            return Err(DbError::Conflict(format!(
                                "lot {} no longer holds {}",
                                lot_id, from
                            )));
                        }
                    }
                }
                LotChange::Delete { lot_id, quantity } => {
                    self.lot_write(lot_id)?;
                    let holds = staged.lots.get(&lot_id).is_some_and(|lot| {
                        lot.user_id == commit.user_id && lot.quantity == quantity
                    });
                    if !holds {
                        return Err(DbError::Conflict(format!(
                            "lot {} no longer holds {}",
                            lot_id, quantity
                        )));
                    }
                    staged.lots.remove(&lot_id);
                }
            }
        }

        *state = staged;
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for MemoryLedger {
    async fn append(&self, entry: NewLogEntry) -> Result<TransactionLogEntry, DbError> {
        if take_fault(&self.failing_log_appends) {
            return Err(DbError::WriteFailed(
                "injected failure appending to the transaction log".to_string(),
            ));
        }
        let entry = entry.into_entry(Uuid::new_v4());
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<TransactionLogEntry>, DbError> {
        let mut entries: Vec<TransactionLogEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps append order for equal timestamps.
        entries.sort_by_key(|entry| entry.executed_at);
        Ok(entries)
    }
}
