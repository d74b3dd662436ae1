use crate::enums::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's cash account. Holdings live in `Lot`s; the account only tracks cash.
///
/// There is deliberately no stored total value: it is derived from cash and
/// open lots whenever it is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub user_id: Uuid,
    pub cash_balance: Decimal,
    pub initial_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One unconsumed purchase batch of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub lot_id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub acquired_at: DateTime<Utc>,
    /// Store-assigned insertion sequence; breaks `acquired_at` ties in FIFO order.
    pub seq: i64,
}

/// A lot that has not been written yet. The store assigns its `seq`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLot {
    pub lot_id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub acquired_at: DateTime<Utc>,
}

impl NewLot {
    pub fn into_lot(self, seq: i64) -> Lot {
        Lot {
            lot_id: self.lot_id,
            user_id: self.user_id,
            symbol: self.symbol,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            acquired_at: self.acquired_at,
            seq,
        }
    }
}

/// A point-in-time price for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub as_of: DateTime<Utc>,
}

/// The aggregated view across all open lots of one symbol. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percent: Decimal,
    /// `None` when no live quote was available and the average cost stands in.
    pub quote_as_of: Option<DateTime<Utc>>,
    pub acquired_dates: Vec<DateTime<Utc>>,
}

/// An executed trade as recorded in the append-only transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLogEntry {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// A log entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub user_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn into_entry(self, entry_id: Uuid) -> TransactionLogEntry {
        TransactionLogEntry {
            entry_id,
            user_id: self.user_id,
            symbol: self.symbol,
            side: self.side,
            quantity: self.quantity,
            price: self.price,
            total_amount: self.total_amount,
            executed_at: self.executed_at,
        }
    }
}

impl TransactionLogEntry {
    /// The signed effect of this entry on cash: buys debit, sells credit.
    pub fn cash_delta(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => -self.total_amount,
            OrderSide::Sell => self.total_amount,
        }
    }
}
