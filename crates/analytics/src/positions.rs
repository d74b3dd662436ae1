use crate::error::AnalyticsError;
use api_client::{PriceOracle, fetch_live_quote};
use chrono::{DateTime, Utc};
use core_types::{Lot, Position, Quote};
use database::LotStore;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The open lots of one symbol, summed.
#[derive(Debug, Clone, PartialEq)]
pub struct LotGroup {
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub acquired_dates: Vec<DateTime<Utc>>,
}

impl LotGroup {
    pub fn average_cost(&self) -> Result<Decimal, AnalyticsError> {
        self.cost_basis.checked_div(self.quantity).ok_or_else(|| {
            AnalyticsError::Calculation(format!(
                "average cost of {} with quantity {}",
                self.symbol, self.quantity
            ))
        })
    }
}

/// Groups lots by symbol, keeping the order in which each symbol is first seen.
pub fn group_lots(lots: &[Lot]) -> Result<Vec<LotGroup>, AnalyticsError> {
    let mut groups: Vec<LotGroup> = Vec::new();
    for lot in lots {
        let cost = lot
            .quantity
            .checked_mul(lot.unit_cost)
            .ok_or_else(|| AnalyticsError::out_of_range(format!("cost of lot {}", lot.lot_id)))?;
        match groups.iter_mut().find(|g| g.symbol == lot.symbol) {
            Some(group) => {
                group.quantity = group.quantity.checked_add(lot.quantity).ok_or_else(|| {
                    AnalyticsError::out_of_range(format!("quantity of {}", lot.symbol))
                })?;
                group.cost_basis = group.cost_basis.checked_add(cost).ok_or_else(|| {
                    AnalyticsError::out_of_range(format!("cost basis of {}", lot.symbol))
                })?;
                group.acquired_dates.push(lot.acquired_at);
            }
            None => groups.push(LotGroup {
                symbol: lot.symbol.clone(),
                quantity: lot.quantity,
                cost_basis: cost,
                acquired_dates: vec![lot.acquired_at],
            }),
        }
    }
    Ok(groups)
}

/// Marks a group to market. Without a quote the average cost stands in for the
/// current price, so the position reports no profit or loss.
pub fn mark_position(group: LotGroup, quote: Option<&Quote>) -> Result<Position, AnalyticsError> {
    let average_cost = group.average_cost()?;
    let current_price = quote.map_or(average_cost, |q| q.price);
    let market_value = group
        .quantity
        .checked_mul(current_price)
        .ok_or_else(|| AnalyticsError::out_of_range(format!("market value of {}", group.symbol)))?;
    let cost_basis = group
        .quantity
        .checked_mul(average_cost)
        .ok_or_else(|| AnalyticsError::out_of_range(format!("cost basis of {}", group.symbol)))?;
    let profit_loss = market_value - cost_basis;
    let profit_loss_percent = if cost_basis > Decimal::ZERO {
        profit_loss
            .checked_div(cost_basis)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(|| {
                AnalyticsError::out_of_range(format!("profit percentage of {}", group.symbol))
            })?
    } else {
        Decimal::ZERO
    };

    Ok(Position {
        symbol: group.symbol,
        quantity: group.quantity,
        average_cost,
        current_price,
        market_value,
        cost_basis,
        profit_loss,
        profit_loss_percent,
        quote_as_of: quote.map(|q| q.as_of),
        acquired_dates: group.acquired_dates,
    })
}

/// Derives a user's positions from their open lots.
pub struct PositionAggregator {
    lots: Arc<dyn LotStore>,
    oracle: Arc<dyn PriceOracle>,
    quote_timeout: Duration,
}

impl PositionAggregator {
    pub fn new(lots: Arc<dyn LotStore>, oracle: Arc<dyn PriceOracle>, quote_timeout: Duration) -> Self {
        Self {
            lots,
            oracle,
            quote_timeout,
        }
    }

    pub async fn list_positions(&self, user_id: Uuid) -> Result<Vec<Position>, AnalyticsError> {
        let lots = self.lots.list_all_open_lots(user_id).await?;
        let groups = group_lots(&lots)?;

        let quotes = join_all(groups.iter().map(|group| {
            fetch_live_quote(self.oracle.as_ref(), &group.symbol, self.quote_timeout)
        }))
        .await;

        groups
            .into_iter()
            .zip(quotes)
            .map(|(group, quote)| {
                let quote = match quote {
                    Ok(quote) => Some(quote),
                    Err(err) => {
                        tracing::warn!(
                            %user_id, symbol = %group.symbol, error = %err,
                            "No live quote; valuing position at average cost."
                        );
                        None
                    }
                };
                mark_position(group, quote.as_ref())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::StaticPriceOracle;
    use chrono::TimeZone;
    use database::MemoryLedger;
    use rust_decimal_macros::dec;

    fn lot(symbol: &str, quantity: Decimal, unit_cost: Decimal, day: u32, seq: i64) -> Lot {
        Lot {
            lot_id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            symbol: symbol.to_string(),
            quantity,
            unit_cost,
            acquired_at: Utc.with_ymd_and_hms(2024, 3, day, 15, 0, 0).unwrap(),
            seq,
        }
    }

    fn quote(symbol: &str, price: Decimal) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            as_of: Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_group_lots_keeps_discovery_order() {
        let lots = vec![
            lot("MSFT", dec!(1), dec!(300), 1, 1),
            lot("AAPL", dec!(10), dec!(150), 2, 2),
            lot("MSFT", dec!(2), dec!(330), 3, 3),
        ];
        let groups = group_lots(&lots).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].symbol, "MSFT");
        assert_eq!(groups[0].quantity, dec!(3));
        assert_eq!(groups[0].cost_basis, dec!(960));
        assert_eq!(groups[0].acquired_dates.len(), 2);
        assert_eq!(groups[1].symbol, "AAPL");
    }

    #[test]
    fn test_mark_position_weighted_average() {
        let lots = vec![
            lot("AAPL", dec!(10), dec!(150), 1, 1),
            lot("AAPL", dec!(5), dec!(160), 2, 2),
        ];
        let group = group_lots(&lots).unwrap().remove(0);
        let position = mark_position(group, Some(&quote("AAPL", dec!(170)))).unwrap();

        assert_eq!(position.quantity, dec!(15));
        assert_eq!(position.cost_basis, dec!(2300));
        assert_eq!(position.market_value, dec!(2550));
        assert_eq!(position.profit_loss, dec!(250));
        assert_eq!(position.profit_loss_percent.round_dp(4), dec!(10.8696));
        assert!(position.quote_as_of.is_some());
    }

    #[test]
    fn test_mark_position_without_quote_uses_average_cost() {
        let group = group_lots(&[lot("TSLA", dec!(4), dec!(200), 1, 1)]).unwrap().remove(0);
        let position = mark_position(group, None).unwrap();

        assert_eq!(position.current_price, dec!(200));
        assert_eq!(position.profit_loss, Decimal::ZERO);
        assert_eq!(position.profit_loss_percent, Decimal::ZERO);
        assert_eq!(position.quote_as_of, None);
    }

    #[tokio::test]
    async fn test_one_failing_symbol_does_not_hide_the_others() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = Uuid::new_v4();
        for (symbol, quantity, cost) in [("AAPL", dec!(2), dec!(100)), ("GONE", dec!(3), dec!(50))] {
            ledger
                .create_lot(core_types::NewLot {
                    lot_id: Uuid::new_v4(),
                    user_id: user,
                    symbol: symbol.to_string(),
                    quantity,
                    unit_cost: cost,
                    acquired_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let oracle = Arc::new(StaticPriceOracle::with_prices([("AAPL", dec!(110))]));
        let aggregator = PositionAggregator::new(ledger, oracle, Duration::from_millis(200));

        let positions = aggregator.list_positions(user).await.unwrap();
        assert_eq!(positions.len(), 2);

        let aapl = positions.iter().find(|p| p.symbol == "AAPL").unwrap();
        assert_eq!(aapl.profit_loss, dec!(20));

        let gone = positions.iter().find(|p| p.symbol == "GONE").unwrap();
        assert_eq!(gone.current_price, dec!(50));
        assert_eq!(gone.market_value, dec!(150));
        assert_eq!(gone.profit_loss, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_no_lots_means_no_positions() {
        let aggregator = PositionAggregator::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(StaticPriceOracle::new()),
            Duration::from_millis(200),
        );
        assert!(aggregator.list_positions(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[test]
    fn test_mark_position_overflow_is_an_error() {
        let group = group_lots(&[lot("AAPL", dec!(10), dec!(1), 1, 1)]).unwrap().remove(0);
        let err = mark_position(group, Some(&quote("AAPL", Decimal::MAX / dec!(2)))).unwrap_err();
        assert!(matches!(err, AnalyticsError::Calculation(_)));
    }

    #[tokio::test]
    async fn test_huge_quote_fails_the_call_instead_of_panicking() {
        let ledger = Arc::new(MemoryLedger::new());
        let user = Uuid::new_v4();
        ledger
            .create_lot(core_types::NewLot {
                lot_id: Uuid::new_v4(),
                user_id: user,
                symbol: "AAPL".to_string(),
                quantity: dec!(10),
                unit_cost: dec!(1),
                acquired_at: Utc::now(),
            })
            .await
            .unwrap();
        let oracle = Arc::new(StaticPriceOracle::with_prices([("AAPL", Decimal::MAX / dec!(2))]));
        let aggregator = PositionAggregator::new(ledger, oracle, Duration::from_millis(200));

        let err = aggregator.list_positions(user).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Calculation(_)));
    }
}
