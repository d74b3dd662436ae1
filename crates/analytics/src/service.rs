use crate::error::AnalyticsError;
use crate::history::{BalancePoint, balance_history};
use crate::positions::PositionAggregator;
use crate::valuation::{PortfolioSummary, value_portfolio};
use api_client::PriceOracle;
use chrono::Utc;
use core_types::{Position, TransactionLogEntry};
use database::{AccountStore, LotStore, TransactionLog};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub balance_history: Vec<BalancePoint>,
    pub current_balance: Decimal,
    pub current_portfolio_value: Decimal,
    pub initial_balance: Decimal,
}

/// Per-user portfolio reads. Takes no trade locks; figures may trail a trade in flight.
pub struct PortfolioService {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    aggregator: PositionAggregator,
}

impl PortfolioService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        lots: Arc<dyn LotStore>,
        log: Arc<dyn TransactionLog>,
        oracle: Arc<dyn PriceOracle>,
        quote_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            log,
            aggregator: PositionAggregator::new(lots, oracle, quote_timeout),
        }
    }

    pub async fn positions(&self, user_id: Uuid) -> Result<Vec<Position>, AnalyticsError> {
        self.aggregator.list_positions(user_id).await
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<PortfolioSummary, AnalyticsError> {
        let account = self.accounts.get_account(user_id).await?;
        let positions = self.aggregator.list_positions(user_id).await?;
        value_portfolio(&account, positions)
    }

    pub async fn balance_history(&self, user_id: Uuid) -> Result<BalanceReport, AnalyticsError> {
        let summary = self.summary(user_id).await?;
        let entries = self.log.list_by_user(user_id).await?;
        let points = balance_history(
            summary.initial_balance,
            &entries,
            Utc::now().date_naive(),
            summary.cash_balance,
            summary.total_value,
        )?;
        tracing::debug!(%user_id, entries = entries.len(), points = points.len(), "Balance history built.");

        Ok(BalanceReport {
            balance_history: points,
            current_balance: summary.cash_balance,
            current_portfolio_value: summary.total_value,
            initial_balance: summary.initial_balance,
        })
    }

    pub async fn transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TransactionLogEntry>, AnalyticsError> {
        Ok(self.log.list_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::StaticPriceOracle;
    use core_types::{NewLogEntry, NewLot, OrderSide};
    use database::{DbError, LedgerCommit, LedgerStore, LotChange, MemoryLedger};
    use rust_decimal_macros::dec;

    async fn buy(ledger: &MemoryLedger, user: Uuid, quantity: Decimal, price: Decimal) {
        let account = ledger.get_account(user).await.unwrap();
        let total = quantity * price;
        let executed_at = Utc::now();
        ledger
            .commit(LedgerCommit {
                user_id: user,
                prior_cash: account.cash_balance,
                new_cash: account.cash_balance - total,
                lot_changes: vec![LotChange::Create(NewLot {
                    lot_id: Uuid::new_v4(),
                    user_id: user,
                    symbol: "AAPL".to_string(),
                    quantity,
                    unit_cost: price,
                    acquired_at: executed_at,
                })],
            })
            .await
            .unwrap();
        ledger
            .append(NewLogEntry {
                user_id: user,
                symbol: "AAPL".to_string(),
                side: OrderSide::Buy,
                quantity,
                price,
                total_amount: total,
                executed_at,
            })
            .await
            .unwrap();
    }

    fn service(ledger: Arc<MemoryLedger>, oracle: Arc<StaticPriceOracle>) -> PortfolioService {
        PortfolioService::new(
            ledger.clone(),
            ledger.clone(),
            ledger,
            oracle,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_summary_and_history_agree_on_current_figures() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = Uuid::new_v4();
        ledger.create_account(user, dec!(100000)).await.unwrap();
        buy(&ledger, user, dec!(10), dec!(150)).await;

        let oracle = Arc::new(StaticPriceOracle::with_prices([("AAPL", dec!(155))]));
        let service = service(ledger, oracle);

        let summary = service.summary(user).await.unwrap();
        assert_eq!(summary.cash_balance, dec!(98500));
        assert_eq!(summary.total_value, dec!(100050));

        let report = service.balance_history(user).await.unwrap();
        assert_eq!(report.current_balance, dec!(98500));
        assert_eq!(report.current_portfolio_value, dec!(100050));
        assert_eq!(report.initial_balance, dec!(100000));
        let today = report.balance_history.last().unwrap();
        assert_eq!(today.portfolio_value, dec!(100050));

        assert_eq!(service.transactions(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_for_unknown_user_fails() {
        let service = service(Arc::new(MemoryLedger::new()), Arc::new(StaticPriceOracle::new()));
        let err = service.summary(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Store(DbError::AccountNotFound(_))));
    }
}
