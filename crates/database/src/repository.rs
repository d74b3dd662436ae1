use crate::DbError;
use crate::store::{AccountStore, LedgerCommit, LedgerStore, LotChange, LotStore, TransactionLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Account, Lot, NewLogEntry, NewLot, OrderSide, TransactionLogEntry};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{FromRow, Transaction};
use std::str::FromStr;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// The Postgres-backed ledger. Encapsulates all SQL the ledger runs.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

/// A row of the `accounts` table.
#[derive(Debug, Clone, FromRow)]
struct DbAccount {
    user_id: Uuid,
    cash_balance: Decimal,
    initial_balance: Decimal,
    created_at: DateTime<Utc>,
}

impl From<DbAccount> for Account {
    fn from(row: DbAccount) -> Self {
        Account {
            user_id: row.user_id,
            cash_balance: row.cash_balance,
            initial_balance: row.initial_balance,
            created_at: row.created_at,
        }
    }
}

/// A row of the `lots` table.
#[derive(Debug, Clone, FromRow)]
struct DbLot {
    lot_id: Uuid,
    seq: i64,
    user_id: Uuid,
    symbol: String,
    quantity: Decimal,
    unit_cost: Decimal,
    acquired_at: DateTime<Utc>,
}

impl From<DbLot> for Lot {
    fn from(row: DbLot) -> Self {
        Lot {
            lot_id: row.lot_id,
            user_id: row.user_id,
            symbol: row.symbol,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            acquired_at: row.acquired_at,
            seq: row.seq,
        }
    }
}

/// A row of the `transactions` table.
#[derive(Debug, Clone, FromRow)]
struct DbLogEntry {
    entry_id: Uuid,
    user_id: Uuid,
    symbol: String,
    side: String,
    quantity: Decimal,
    price: Decimal,
    total_amount: Decimal,
    executed_at: DateTime<Utc>,
}

impl TryFrom<DbLogEntry> for TransactionLogEntry {
    type Error = DbError;

    fn try_from(row: DbLogEntry) -> Result<Self, Self::Error> {
        let side = OrderSide::from_str(&row.side)
            .map_err(|e| DbError::InvalidRow(format!("transaction {}: {}", row.entry_id, e)))?;
        Ok(TransactionLogEntry {
            entry_id: row.entry_id,
            user_id: row.user_id,
            symbol: row.symbol,
            side,
            quantity: row.quantity,
            price: row.price,
            total_amount: row.total_amount,
            executed_at: row.executed_at,
        })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

impl PgLedger {
    /// Creates a new `PgLedger` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_lot(tx: &mut Transaction<'_, Postgres>, lot: &NewLot) -> Result<Lot, DbError> {
        let row = sqlx::query_as::<_, DbLot>(
            r#"
            INSERT INTO lots (lot_id, user_id, symbol, quantity, unit_cost, acquired_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING lot_id, seq, user_id, symbol, quantity, unit_cost, acquired_at
            "#,
        )
        .bind(lot.lot_id)
        .bind(lot.user_id)
        .bind(&lot.symbol)
        .bind(lot.quantity)
        .bind(lot.unit_cost)
        .bind(lot.acquired_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl AccountStore for PgLedger {
    async fn get_account(&self, user_id: Uuid) -> Result<Account, DbError> {
        let row = sqlx::query_as::<_, DbAccount>(
            "SELECT user_id, cash_balance, initial_balance, created_at FROM accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::AccountNotFound(user_id))?;
        Ok(row.into())
    }

    async fn create_account(
        &self,
        user_id: Uuid,
        starting_balance: Decimal,
    ) -> Result<Account, DbError> {
        let row = sqlx::query_as::<_, DbAccount>(
            r#"
            INSERT INTO accounts (user_id, cash_balance, initial_balance, created_at)
            VALUES ($1, $2, $2, $3)
            RETURNING user_id, cash_balance, initial_balance, created_at
            "#,
        )
        .bind(user_id)
        .bind(starting_balance)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::AccountExists(user_id)
            } else {
                e.into()
            }
        })?;
        Ok(row.into())
    }

    async fn update_balance(&self, user_id: Uuid, new_cash: Decimal) -> Result<(), DbError> {
        if new_cash.is_sign_negative() {
            return Err(DbError::InvariantViolation(format!(
                "cash balance of user {} would become {}",
                user_id, new_cash
            )));
        }
        let result = sqlx::query("UPDATE accounts SET cash_balance = $1 WHERE user_id = $2")
            .bind(new_cash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::AccountNotFound(user_id));
        }
        Ok(())
    }
}

#[async_trait]
impl LotStore for PgLedger {
    async fn list_open_lots(&self, user_id: Uuid, symbol: &str) -> Result<Vec<Lot>, DbError> {
        let rows = sqlx::query_as::<_, DbLot>(
            r#"
            SELECT lot_id, seq, user_id, symbol, quantity, unit_cost, acquired_at
            FROM lots
            WHERE user_id = $1 AND symbol = $2
            ORDER BY acquired_at ASC, seq ASC
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Lot::from).collect())
    }

    async fn list_all_open_lots(&self, user_id: Uuid) -> Result<Vec<Lot>, DbError> {
        let rows = sqlx::query_as::<_, DbLot>(
            r#"
            SELECT lot_id, seq, user_id, symbol, quantity, unit_cost, acquired_at
            FROM lots
            WHERE user_id = $1
            ORDER BY acquired_at ASC, seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Lot::from).collect())
    }

    async fn create_lot(&self, lot: NewLot) -> Result<Lot, DbError> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_lot(&mut tx, &lot).await?;
        tx.commit().await?;
        Ok(created)
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
        let result = sqlx::query("UPDATE lots SET quantity = $1 WHERE lot_id = $2")
            .bind(new_quantity)
            .bind(lot_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::LotNotFound(lot_id));
        }
        Ok(())
    }

    async fn delete_lot(&self, lot_id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM lots WHERE lot_id = $1")
            .bind(lot_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::LotNotFound(lot_id));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    /// Applies the account update and every lot change inside one transaction.
    /// Any early return drops `tx`, which rolls everything back.
    async fn commit(&self, commit: LedgerCommit) -> Result<(), DbError> {
        commit.check_invariants()?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE accounts SET cash_balance = $1 WHERE user_id = $2 AND cash_balance = $3",
        )
        .bind(commit.new_cash)
        .bind(commit.user_id)
        .bind(commit.prior_cash)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(DbError::Conflict(format!(
                "cash balance of user {} is no longer {}",
                commit.user_id, commit.prior_cash
            )));
        }

        for change in &commit.lot_changes {
            match change {
                LotChange::Create(lot) => {
                    Self::insert_lot(&mut tx, lot).await?;
                }
                LotChange::Reduce { lot_id, from, to } => {
                    let result = sqlx::query(
                        "UPDATE lots SET quantity = $1 WHERE lot_id = $2 AND user_id = $3 AND quantity = $4",
                    )
                    .bind(to)
                    .bind(lot_id)
                    .bind(commit.user_id)
                    .bind(from)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() != 1 {
                        return Err(DbError::Conflict(format!(
                            "lot {} no longer holds {}",
                            lot_id, from
                        )));
                    }
                }
                LotChange::Delete { lot_id, quantity } => {
                    let result = sqlx::query(
                        "DELETE FROM lots WHERE lot_id = $1 AND user_id = $2 AND quantity = $3",
                    )
                    .bind(lot_id)
                    .bind(commit.user_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() != 1 {
                        return Err(DbError::Conflict(format!(
                            "lot {} no longer holds {}",
                            lot_id, quantity
                        )));
                    }
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(
            user_id = %commit.user_id,
            lot_changes = commit.lot_changes.len(),
            "Ledger commit applied."
        );
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for PgLedger {
    async fn append(&self, entry: NewLogEntry) -> Result<TransactionLogEntry, DbError> {
        let row = sqlx::query_as::<_, DbLogEntry>(
            r#"
            INSERT INTO transactions (
                entry_id, user_id, symbol, side, quantity, price, total_amount, executed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING entry_id, user_id, symbol, side, quantity, price, total_amount, executed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(&entry.symbol)
        .bind(entry.side.as_str())
        .bind(entry.quantity)
        .bind(entry.price)
        .bind(entry.total_amount)
        .bind(entry.executed_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<TransactionLogEntry>, DbError> {
        let rows = sqlx::query_as::<_, DbLogEntry>(
            r#"
            SELECT entry_id, user_id, symbol, side, quantity, price, total_amount, executed_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY executed_at ASC, seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransactionLogEntry::try_from).collect()
    }
}
