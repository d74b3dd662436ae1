use crate::error::AnalyticsError;
use chrono::NaiveDate;
use core_types::TransactionLogEntry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The account's cash at the close of one day.
///
/// No historical prices are kept, so for past days `portfolio_value` is the cash
/// balance; only today's point carries the marked-to-market total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePoint {
    pub date: NaiveDate,
    pub cash_balance: Decimal,
    pub portfolio_value: Decimal,
}

/// Replays the log over the initial balance, one point per day, oldest first.
///
/// `entries` must be in log order. The first trading day opens at the initial
/// balance; every later trade on the same day overwrites that day's point.
pub fn balance_history(
    initial_balance: Decimal,
    entries: &[TransactionLogEntry],
    today: NaiveDate,
    current_cash: Decimal,
    current_total: Decimal,
) -> Result<Vec<BalancePoint>, AnalyticsError> {
    let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    if let Some(first) = entries.first() {
        days.insert(first.executed_at.date_naive(), initial_balance);
    }

    let mut running = initial_balance;
    for entry in entries {
        running = running.checked_add(entry.cash_delta()).ok_or_else(|| {
            AnalyticsError::out_of_range(format!("cash balance after entry {}", entry.entry_id))
        })?;
        days.insert(entry.executed_at.date_naive(), running);
    }

    let mut points: Vec<BalancePoint> = days
        .into_iter()
        .filter(|(date, _)| *date != today)
        .map(|(date, cash)| BalancePoint {
            date,
            cash_balance: cash,
            portfolio_value: cash,
        })
        .collect();
    points.push(BalancePoint {
        date: today,
        cash_balance: current_cash,
        portfolio_value: current_total,
    });
    points.sort_by_key(|point| point.date);
    Ok(points)
}
