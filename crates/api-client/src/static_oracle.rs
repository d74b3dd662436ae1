use crate::error::ApiError;
use crate::PriceOracle;
use async_trait::async_trait;
use chrono::Utc;
use core_types::Quote;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-process price table. Prices only change when `set_price` is called.
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        let prices = prices
            .into_iter()
            .map(|(symbol, price)| (symbol.as_ref().to_ascii_uppercase(), price))
            .collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .write()
            .await
            .insert(symbol.to_ascii_uppercase(), price);
    }

    pub async fn remove(&self, symbol: &str) {
        self.prices.write().await.remove(&symbol.to_ascii_uppercase());
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn quote(&self, symbol: &str) -> Result<Quote, ApiError> {
        let symbol = symbol.to_ascii_uppercase();
        let price = self
            .prices
            .read()
            .await
            .get(&symbol)
            .copied()
            .ok_or_else(|| ApiError::SymbolNotFound(symbol.clone()))?;
        Ok(Quote {
            symbol,
            price,
            as_of: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_prices_can_move() {
        let oracle = StaticPriceOracle::with_prices([("aapl", dec!(150))]);
        assert_eq!(oracle.quote("AAPL").await.unwrap().price, dec!(150));

        oracle.set_price("AAPL", dec!(170)).await;
        assert_eq!(oracle.quote("aapl").await.unwrap().price, dec!(170));

        oracle.remove("AAPL").await;
        assert!(matches!(
            oracle.quote("AAPL").await,
            Err(ApiError::SymbolNotFound(_))
        ));
    }
}
