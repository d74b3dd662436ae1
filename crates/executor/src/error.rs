use database::DbError;
use core_types::CoreError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Why a trade or account operation did not happen.
///
/// Every variant except `Persistence` is raised before anything is written.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Could not fetch current stock price for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error(
        "Insufficient balance. You have ${available:.2}, but need ${required:.2} for {quantity} shares of {symbol}."
    )]
    InsufficientFunds {
        symbol: String,
        quantity: Decimal,
        available: Decimal,
        required: Decimal,
    },

    #[error(
        "Insufficient shares. You own {owned:.4} shares of {symbol}, but are trying to sell {requested:.4} shares."
    )]
    InsufficientShares {
        symbol: String,
        owned: Decimal,
        requested: Decimal,
    },

    #[error("No account exists for user {0}")]
    AccountNotFound(Uuid),

    #[error("An account already exists for user {0}")]
    AccountExists(Uuid),

    #[error("Ledger persistence failed: {0}")]
    Persistence(DbError),
}

impl From<CoreError> for TradeError {
    fn from(err: CoreError) -> Self {
        TradeError::Validation(err.to_string())
    }
}

impl From<DbError> for TradeError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::AccountNotFound(user_id) => TradeError::AccountNotFound(user_id),
            DbError::AccountExists(user_id) => TradeError::AccountExists(user_id),
            other => TradeError::Persistence(other),
        }
    }
}
