use crate::error::TradeError;
use crate::fifo::{LotFill, plan_sale};
use crate::journal::{RetryPolicy, TradeJournal};
use crate::locks::UserLocks;
use api_client::{PriceOracle, fetch_live_quote};
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{
    Account, NewLogEntry, NewLot, OrderSide, Quote, normalize_symbol, validate_quantity,
};
use database::{LedgerCommit, LedgerStore, LotChange, TransactionLog};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Runtime parameters of the `TradeExecutor`.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub starting_balance: Decimal,
    pub quote_timeout: Duration,
    pub journal: RetryPolicy,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            starting_balance: config.account.starting_balance,
            quote_timeout: Duration::from_millis(config.oracle.timeout_ms),
            journal: RetryPolicy::from(&config.journal),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            starting_balance: dec!(100000),
            quote_timeout: Duration::from_secs(5),
            journal: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(50),
            },
        }
    }
}

/// The outcome of a completed purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyReceipt {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_cost: Decimal,
    pub new_balance: Decimal,
    pub lot_id: Uuid,
    pub executed_at: DateTime<Utc>,
    /// Whether the trade made it into the transaction log.
    pub logged: bool,
}

/// The outcome of a completed sale.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellReceipt {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Proceeds of the sale.
    pub total_value: Decimal,
    /// Cost basis per share of the lots consumed.
    pub average_cost: Decimal,
    /// Realized profit or loss.
    pub profit_loss: Decimal,
    pub new_balance: Decimal,
    pub fills: Vec<LotFill>,
    pub executed_at: DateTime<Utc>,
    pub logged: bool,
}

/// Executes buy and sell orders against the ledger.
///
/// A trade is one guarded `LedgerCommit` (cash and lots together) followed by a
/// best-effort journal entry. Trades of the same user are serialised.
pub struct TradeExecutor {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
    journal: TradeJournal,
    locks: UserLocks,
    settings: ExecutorSettings,
}

impl TradeExecutor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        log: Arc<dyn TransactionLog>,
        oracle: Arc<dyn PriceOracle>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            journal: TradeJournal::new(log, settings.journal),
            locks: UserLocks::new(),
            settings,
        }
    }

    /// Opens a paper account funded with the configured starting balance.
    pub async fn open_account(&self, user_id: Uuid) -> Result<Account, TradeError> {
        let account = self
            .store
            .create_account(user_id, self.settings.starting_balance)
            .await?;
        tracing::info!(%user_id, balance = %account.cash_balance, "Account opened.");
        Ok(account)
    }

    /// Fetches a fresh, tradeable quote for `symbol`.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        fetch_live_quote(self.oracle.as_ref(), &symbol, self.settings.quote_timeout)
            .await
            .map_err(|e| TradeError::QuoteUnavailable {
                symbol: symbol.clone(),
                reason: e.to_string(),
            })
    }

    pub async fn buy(
        &self,
        user_id: Uuid,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<BuyReceipt, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        let quantity = validate_quantity(quantity)?;
        let price = self.quote(&symbol).await?.price;
        let total_cost = order_value(&symbol, price, quantity)?;

        let _guard = self.locks.acquire(user_id).await;
        let account = self.store.get_account(user_id).await?;
        if account.cash_balance < total_cost {
            return Err(TradeError::InsufficientFunds {
                symbol,
                quantity,
                available: account.cash_balance,
                required: total_cost,
            });
        }

        let new_balance = account.cash_balance - total_cost;
        let executed_at = Utc::now();
        let lot = NewLot {
            lot_id: Uuid::new_v4(),
            user_id,
            symbol: symbol.clone(),
            quantity,
            unit_cost: price,
            acquired_at: executed_at,
        };
        let lot_id = lot.lot_id;

        self.store
            .commit(LedgerCommit {
                user_id,
                prior_cash: account.cash_balance,
                new_cash: new_balance,
                lot_changes: vec![LotChange::Create(lot)],
            })
            .await?;
        tracing::info!(
            %user_id, %symbol, %quantity, %price, %total_cost, %new_balance,
            "Buy executed."
        );

        let logged = self
            .journal_trade(NewLogEntry {
                user_id,
                symbol: symbol.clone(),
                side: OrderSide::Buy,
                quantity,
                price,
                total_amount: total_cost,
                executed_at,
            })
            .await;

        Ok(BuyReceipt {
            symbol,
            quantity,
            price,
            total_cost,
            new_balance,
            lot_id,
            executed_at,
            logged,
        })
    }

    pub async fn sell(
        &self,
        user_id: Uuid,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<SellReceipt, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        let quantity = validate_quantity(quantity)?;
        let price = self.quote(&symbol).await?.price;
        let total_proceeds = order_value(&symbol, price, quantity)?;

        let _guard = self.locks.acquire(user_id).await;
        let account = self.store.get_account(user_id).await?;
        let lots = self.store.list_open_lots(user_id, &symbol).await?;
        let plan = plan_sale(&symbol, &lots, quantity)?;

        let new_balance = account
            .cash_balance
            .checked_add(total_proceeds)
            .ok_or_else(|| {
                TradeError::Validation("resulting cash balance is out of range".to_string())
            })?;
        let average_cost = plan.average_cost(quantity);
        let profit_loss = total_proceeds - plan.cost_removed;
        let executed_at = Utc::now();

        self.store
            .commit(LedgerCommit {
                user_id,
                prior_cash: account.cash_balance,
                new_cash: new_balance,
                lot_changes: plan.lot_changes,
            })
            .await?;
        tracing::info!(
            %user_id, %symbol, %quantity, %price, proceeds = %total_proceeds,
            %profit_loss, %new_balance, lots = plan.fills.len(),
            "Sell executed."
        );

        let logged = self
            .journal_trade(NewLogEntry {
                user_id,
                symbol: symbol.clone(),
                side: OrderSide::Sell,
                quantity,
                price,
                total_amount: total_proceeds,
                executed_at,
            })
            .await;

        Ok(SellReceipt {
            symbol,
            quantity,
            price,
            total_value: total_proceeds,
            average_cost,
            profit_loss,
            new_balance,
            fills: plan.fills,
            executed_at,
            logged,
        })
    }

    /// The trade is final by now; a journal failure is logged and reported, not raised.
    async fn journal_trade(&self, entry: NewLogEntry) -> bool {
        match self.journal.record(entry).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Trade committed but not journaled.");
                false
            }
        }
    }
}

fn order_value(symbol: &str, price: Decimal, quantity: Decimal) -> Result<Decimal, TradeError> {
    price.checked_mul(quantity).ok_or_else(|| {
        TradeError::Validation(format!(
            "order value of {} x {} for {} is out of range",
            quantity, price, symbol
        ))
    })
}
