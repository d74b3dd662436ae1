use crate::error::AnalyticsError;
use core_types::{Account, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's whole portfolio at one moment.
///
/// `total_value` is always `cash_balance + holdings_value`; it is recomputed on
/// every read and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub cash_balance: Decimal,
    pub initial_balance: Decimal,
    pub holdings_value: Decimal,
    pub total_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_profit_loss: Decimal,
    pub total_return_percent: Decimal,
    pub positions: Vec<Position>,
}

pub fn value_portfolio(
    account: &Account,
    positions: Vec<Position>,
) -> Result<PortfolioSummary, AnalyticsError> {
    let holdings_value = checked_sum(positions.iter().map(|p| p.market_value), "holdings value")?;
    let cost_basis = checked_sum(positions.iter().map(|p| p.cost_basis), "cost basis")?;
    let total_value = account
        .cash_balance
        .checked_add(holdings_value)
        .ok_or_else(|| AnalyticsError::out_of_range("total portfolio value"))?;

    let total_return_percent = if account.initial_balance.is_zero() {
        Decimal::ZERO
    } else {
        (total_value - account.initial_balance)
            .checked_div(account.initial_balance)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(|| AnalyticsError::out_of_range("total return"))?
    };

    Ok(PortfolioSummary {
        cash_balance: account.cash_balance,
        initial_balance: account.initial_balance,
        holdings_value,
        total_value,
        cost_basis,
        unrealized_profit_loss: holdings_value - cost_basis,
        total_return_percent,
        positions,
    })
}

fn checked_sum<I>(values: I, what: &str) -> Result<Decimal, AnalyticsError>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
        .ok_or_else(|| AnalyticsError::out_of_range(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn account(cash: Decimal, initial: Decimal) -> Account {
        Account {
            user_id: Uuid::new_v4(),
            cash_balance: cash,
            initial_balance: initial,
            created_at: Utc::now(),
        }
    }

    fn position(symbol: &str, quantity: Decimal, average_cost: Decimal, price: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            quantity,
            average_cost,
            current_price: price,
            market_value: quantity * price,
            cost_basis: quantity * average_cost,
            profit_loss: quantity * (price - average_cost),
            profit_loss_percent: Decimal::ZERO,
            quote_as_of: None,
            acquired_dates: Vec::new(),
        }
    }

    #[test]
    fn test_total_value_is_cash_plus_holdings() {
        let summary = value_portfolio(
            &account(dec!(99740), dec!(100000)),
            vec![position("AAPL", dec!(3), dec!(160), dec!(170))],
        )
        .unwrap();

        assert_eq!(summary.holdings_value, dec!(510));
        assert_eq!(summary.total_value, dec!(100250));
        assert_eq!(summary.cost_basis, dec!(480));
        assert_eq!(summary.unrealized_profit_loss, dec!(30));
        assert_eq!(summary.total_return_percent, dec!(0.25));
    }

    #[test]
    fn test_empty_portfolio_is_all_cash() {
        let summary = value_portfolio(&account(dec!(100000), dec!(100000)), Vec::new()).unwrap();
        assert_eq!(summary.total_value, dec!(100000));
        assert_eq!(summary.total_return_percent, Decimal::ZERO);
    }

    #[test]
    fn test_zero_initial_balance_has_no_return() {
        let summary = value_portfolio(&account(dec!(0), dec!(0)), Vec::new()).unwrap();
        assert_eq!(summary.total_return_percent, Decimal::ZERO);
    }

    #[test]
    fn test_holdings_beyond_decimal_range_are_an_error() {
        let half = Decimal::MAX / dec!(2);
        let positions = vec![
            position("AAPL", dec!(1), dec!(1), half),
            position("MSFT", dec!(1), dec!(1), half),
            position("NVDA", dec!(1), dec!(1), half),
        ];
        let err = value_portfolio(&account(dec!(100000), dec!(100000)), positions).unwrap_err();
        assert!(matches!(err, AnalyticsError::Calculation(_)));
    }
}
