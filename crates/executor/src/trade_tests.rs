use crate::{ExecutorSettings, RetryPolicy, TradeError, TradeExecutor};
use api_client::error::ApiError;
use api_client::{PriceOracle, StaticPriceOracle};
use async_trait::async_trait;
use core_types::{OrderSide, Quote};
use database::{AccountStore, DbError, LotStore, MemoryLedger, TransactionLog};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    ledger: Arc<MemoryLedger>,
    oracle: Arc<StaticPriceOracle>,
    executor: Arc<TradeExecutor>,
    user: Uuid,
}

fn settings() -> ExecutorSettings {
    ExecutorSettings {
        starting_balance: dec!(100000),
        quote_timeout: Duration::from_millis(200),
        journal: RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
        },
    }
}

async fn harness() -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let oracle = Arc::new(StaticPriceOracle::new());
    let executor = Arc::new(TradeExecutor::new(
        ledger.clone(),
        ledger.clone(),
        oracle.clone(),
        settings(),
    ));
    let user = Uuid::new_v4();
    executor.open_account(user).await.unwrap();
    Harness {
        ledger,
        oracle,
        executor,
        user,
    }
}

impl Harness {
    async fn cash(&self) -> Decimal {
        self.ledger.get_account(self.user).await.unwrap().cash_balance
    }

    async fn lots(&self, symbol: &str) -> Vec<(Decimal, Decimal)> {
        self.ledger
            .list_open_lots(self.user, symbol)
            .await
            .unwrap()
            .into_iter()
            .map(|lot| (lot.quantity, lot.unit_cost))
            .collect()
    }

    async fn price(&self, symbol: &str, price: Decimal) {
        self.oracle.set_price(symbol, price).await;
    }
}

struct SlowOracle;

#[async_trait]
impl PriceOracle for SlowOracle {
    async fn quote(&self, _symbol: &str) -> Result<Quote, ApiError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Err(ApiError::RateLimited)
    }
}

#[tokio::test]
async fn test_fifo_scenario_from_a_fresh_account() {
    let h = harness().await;

    h.price("AAPL", dec!(150)).await;
    let first = h.executor.buy(h.user, "AAPL", dec!(10)).await.unwrap();
    assert_eq!(first.total_cost, dec!(1500));
    assert_eq!(first.new_balance, dec!(98500));
    assert_eq!(h.lots("AAPL").await, vec![(dec!(10), dec!(150))]);

    h.price("AAPL", dec!(160)).await;
    let second = h.executor.buy(h.user, "AAPL", dec!(5)).await.unwrap();
    assert_eq!(second.new_balance, dec!(97700));
    assert_eq!(
        h.lots("AAPL").await,
        vec![(dec!(10), dec!(150)), (dec!(5), dec!(160))]
    );

    h.price("AAPL", dec!(170)).await;
    let sale = h.executor.sell(h.user, "AAPL", dec!(12)).await.unwrap();
    assert_eq!(sale.total_value, dec!(2040));
    assert_eq!(sale.profit_loss, dec!(220));
    assert_eq!(sale.total_value - sale.profit_loss, dec!(1820));
    assert_eq!(sale.new_balance, dec!(99740));
    assert_eq!(sale.fills.len(), 2);
    assert_eq!(h.cash().await, dec!(99740));
    assert_eq!(h.lots("AAPL").await, vec![(dec!(3), dec!(160))]);
}

#[tokio::test]
async fn test_buy_then_sell_at_same_price_restores_cash() {
    let h = harness().await;
    h.price("MSFT", dec!(312.37)).await;

    h.executor.buy(h.user, "MSFT", dec!(3.25)).await.unwrap();
    let sale = h.executor.sell(h.user, "MSFT", dec!(3.25)).await.unwrap();

    assert_eq!(sale.profit_loss, Decimal::ZERO);
    assert_eq!(h.cash().await, dec!(100000));
    assert!(h.lots("MSFT").await.is_empty());
}

#[tokio::test]
async fn test_buy_with_exactly_enough_cash_empties_the_account() {
    let h = harness().await;
    h.price("NVDA", dec!(1000)).await;

    let receipt = h.executor.buy(h.user, "NVDA", dec!(100)).await.unwrap();
    assert_eq!(receipt.new_balance, Decimal::ZERO);
    assert_eq!(h.cash().await, Decimal::ZERO);
}

#[tokio::test]
async fn test_selling_everything_leaves_no_lots() {
    let h = harness().await;
    h.price("AAPL", dec!(10)).await;
    h.executor.buy(h.user, "AAPL", dec!(5)).await.unwrap();
    h.executor.buy(h.user, "AAPL", dec!(5)).await.unwrap();

    let sale = h.executor.sell(h.user, "AAPL", dec!(10)).await.unwrap();
    assert!(sale.fills.iter().all(|fill| fill.remaining.is_zero()));
    assert!(h.lots("AAPL").await.is_empty());
}

#[tokio::test]
async fn test_insufficient_funds_changes_nothing() {
    let h = harness().await;
    h.price("BRK.A", dec!(600000)).await;

    let err = h.executor.buy(h.user, "BRK.A", dec!(1)).await.unwrap_err();
    match &err {
        TradeError::InsufficientFunds {
            available, required, ..
        } => {
            assert_eq!(*available, dec!(100000));
            assert_eq!(*required, dec!(600000));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("100000.00"), "{}", message);
    assert!(message.contains("600000.00"), "{}", message);

    assert_eq!(h.cash().await, dec!(100000));
    assert!(h.lots("BRK.A").await.is_empty());
    assert!(h.ledger.list_by_user(h.user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_shares_changes_nothing() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;
    h.executor.buy(h.user, "AAPL", dec!(2)).await.unwrap();

    let err = h.executor.sell(h.user, "AAPL", dec!(3)).await.unwrap_err();
    assert!(matches!(err, TradeError::InsufficientShares { .. }));
    assert!(err.to_string().contains("2.0000"), "{}", err);
    assert_eq!(h.cash().await, dec!(99800));
    assert_eq!(h.lots("AAPL").await, vec![(dec!(2), dec!(100))]);
}

#[tokio::test]
async fn test_missing_or_bad_quote_is_quote_unavailable() {
    let h = harness().await;

    let unknown = h.executor.buy(h.user, "NOPE", dec!(1)).await.unwrap_err();
    assert!(matches!(unknown, TradeError::QuoteUnavailable { .. }));

    h.price("ZERO", dec!(0)).await;
    let zero = h.executor.buy(h.user, "ZERO", dec!(1)).await.unwrap_err();
    assert!(matches!(zero, TradeError::QuoteUnavailable { .. }));

    assert_eq!(h.cash().await, dec!(100000));
}

#[tokio::test]
async fn test_oracle_timeout_is_quote_unavailable() {
    let ledger = Arc::new(MemoryLedger::new());
    let executor = TradeExecutor::new(ledger.clone(), ledger.clone(), Arc::new(SlowOracle), settings());
    let user = Uuid::new_v4();
    executor.open_account(user).await.unwrap();

    let started = std::time::Instant::now();
    let err = executor.buy(user, "AAPL", dec!(1)).await.unwrap_err();
    assert!(matches!(err, TradeError::QuoteUnavailable { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_order_validation() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;

    assert!(matches!(
        h.executor.buy(h.user, "AAPL", dec!(0)).await,
        Err(TradeError::Validation(_))
    ));
    assert!(matches!(
        h.executor.sell(h.user, "AAPL", dec!(-1)).await,
        Err(TradeError::Validation(_))
    ));
    assert!(matches!(
        h.executor.buy(h.user, "   ", dec!(1)).await,
        Err(TradeError::Validation(_))
    ));

    let receipt = h.executor.buy(h.user, "  aapl ", dec!(1)).await.unwrap();
    assert_eq!(receipt.symbol, "AAPL");
}

#[tokio::test]
async fn test_failed_lot_write_rolls_back_buy_and_sell() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;

    h.ledger.fail_next_lot_writes(1);
    let err = h.executor.buy(h.user, "AAPL", dec!(5)).await.unwrap_err();
    assert!(matches!(err, TradeError::Persistence(DbError::WriteFailed(_))));
    assert_eq!(h.cash().await, dec!(100000));
    assert!(h.lots("AAPL").await.is_empty());

    h.executor.buy(h.user, "AAPL", dec!(2)).await.unwrap();
    h.executor.buy(h.user, "AAPL", dec!(2)).await.unwrap();

    // The sale spans two lots; failing either write must undo both.
    h.ledger.fail_next_lot_writes(1);
    let lots_before = h.lots("AAPL").await;
    let err = h.executor.sell(h.user, "AAPL", dec!(3)).await.unwrap_err();
    assert!(matches!(err, TradeError::Persistence(_)));
    assert_eq!(h.cash().await, dec!(99600));
    assert_eq!(h.lots("AAPL").await, lots_before);
    assert_eq!(h.ledger.list_by_user(h.user).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_journal_failure_does_not_fail_the_trade() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;

    h.ledger.fail_next_log_appends(10);
    let receipt = h.executor.buy(h.user, "AAPL", dec!(1)).await.unwrap();
    assert!(!receipt.logged);
    assert_eq!(h.cash().await, dec!(99900));
    assert_eq!(h.lots("AAPL").await.len(), 1);
    assert!(h.ledger.list_by_user(h.user).await.unwrap().is_empty());

    h.ledger.fail_next_log_appends(1);
    let receipt = h.executor.sell(h.user, "AAPL", dec!(1)).await.unwrap();
    assert!(receipt.logged, "one failure is absorbed by the retry");
}

#[tokio::test]
async fn test_trades_are_journaled_in_order() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;
    h.executor.buy(h.user, "AAPL", dec!(4)).await.unwrap();
    h.price("AAPL", dec!(110)).await;
    h.executor.sell(h.user, "AAPL", dec!(1)).await.unwrap();

    let entries = h.ledger.list_by_user(h.user).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].side, OrderSide::Buy);
    assert_eq!(entries[0].total_amount, dec!(400));
    assert_eq!(entries[1].side, OrderSide::Sell);
    assert_eq!(entries[1].price, dec!(110));
    assert_eq!(entries[1].total_amount, dec!(110));
}

#[tokio::test]
async fn test_cash_plus_holdings_is_conserved_at_a_fixed_price() {
    let h = harness().await;
    let price = dec!(42.17);
    h.price("AMD", price).await;

    for (side, quantity) in [
        (OrderSide::Buy, dec!(10)),
        (OrderSide::Buy, dec!(3.5)),
        (OrderSide::Sell, dec!(7)),
        (OrderSide::Buy, dec!(1.25)),
        (OrderSide::Sell, dec!(6.75)),
        (OrderSide::Buy, dec!(20)),
    ] {
        match side {
            OrderSide::Buy => {
                h.executor.buy(h.user, "AMD", quantity).await.unwrap();
            }
            OrderSide::Sell => {
                h.executor.sell(h.user, "AMD", quantity).await.unwrap();
            }
        }
        let held: Decimal = h.lots("AMD").await.iter().map(|(q, _)| *q * price).sum();
        assert_eq!(h.cash().await + held, dec!(100000));
    }
}

#[tokio::test]
async fn test_each_trade_requeries_the_oracle() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;
    let first = h.executor.buy(h.user, "AAPL", dec!(1)).await.unwrap();
    h.price("AAPL", dec!(101)).await;
    let second = h.executor.buy(h.user, "AAPL", dec!(1)).await.unwrap();
    assert_eq!(first.price, dec!(100));
    assert_eq!(second.price, dec!(101));
}

#[tokio::test]
async fn test_accounts_must_exist_and_open_once() {
    let h = harness().await;
    h.price("AAPL", dec!(100)).await;

    assert!(matches!(
        h.executor.open_account(h.user).await,
        Err(TradeError::AccountExists(_))
    ));
    let stranger = Uuid::new_v4();
    assert!(matches!(
        h.executor.buy(stranger, "AAPL", dec!(1)).await,
        Err(TradeError::AccountNotFound(_))
    ));
    assert!(matches!(
        h.executor.sell(stranger, "AAPL", dec!(1)).await,
        Err(TradeError::AccountNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buys_never_overspend() {
    let ledger = Arc::new(MemoryLedger::new());
    let oracle = Arc::new(StaticPriceOracle::with_prices([("AAPL", dec!(100))]));
    let executor = Arc::new(TradeExecutor::new(
        ledger.clone(),
        ledger.clone(),
        oracle,
        ExecutorSettings {
            starting_balance: dec!(1000),
            ..settings()
        },
    ));
    let user = Uuid::new_v4();
    executor.open_account(user).await.unwrap();

    let orders = (0..20).map(|_| {
        let executor = executor.clone();
        tokio::spawn(async move { executor.buy(user, "AAPL", dec!(1)).await })
    });
    let results = futures::future::join_all(orders).await;

    let filled = results
        .iter()
        .filter(|result| matches!(result, Ok(Ok(_))))
        .count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Ok(Err(TradeError::InsufficientFunds { .. }))))
        .count();
    assert_eq!(filled, 10);
    assert_eq!(rejected, 10);
    assert_eq!(ledger.get_account(user).await.unwrap().cash_balance, Decimal::ZERO);
    assert_eq!(ledger.list_open_lots(user, "AAPL").await.unwrap().len(), 10);
}
