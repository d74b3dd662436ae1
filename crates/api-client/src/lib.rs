use crate::error::ApiError;
use crate::responses::GlobalQuoteEnvelope;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use configuration::{OracleProvider, OracleSettings};
use core_types::Quote;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod error;
pub mod responses;
pub mod static_oracle;
// --- Public API ---
pub use static_oracle::StaticPriceOracle;

/// The source of current market prices.
///
/// The ledger never caches what this returns: every trade asks again.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Returns the latest price for an already-normalised symbol.
    async fn quote(&self, symbol: &str) -> Result<Quote, ApiError>;
}

/// Queries the oracle with a deadline and rejects prices that cannot be traded at.
///
/// Every caller in the ledger goes through here, so a timeout and a non-positive
/// price are indistinguishable from any other provider failure.
pub async fn fetch_live_quote(
    oracle: &dyn PriceOracle,
    symbol: &str,
    timeout: Duration,
) -> Result<Quote, ApiError> {
    let quote = tokio::time::timeout(timeout, oracle.quote(symbol))
        .await
        .map_err(|_| ApiError::Timeout {
            symbol: symbol.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

    if quote.price <= Decimal::ZERO {
        return Err(ApiError::InvalidPrice {
            symbol: symbol.to_string(),
            price: quote.price,
        });
    }
    tracing::debug!(symbol, price = %quote.price, as_of = %quote.as_of, "Quote received.");
    Ok(quote)
}

/// Builds the oracle selected in configuration.
pub fn build_oracle(settings: &OracleSettings) -> Result<Arc<dyn PriceOracle>, ApiError> {
    match settings.provider {
        OracleProvider::AlphaVantage => Ok(Arc::new(AlphaVantageClient::new(settings)?)),
        OracleProvider::Static => Ok(Arc::new(StaticPriceOracle::with_prices(
            settings
                .static_prices
                .iter()
                .map(|(symbol, price)| (symbol.clone(), *price)),
        ))),
    }
}

/// A concrete `PriceOracle` backed by the Alpha Vantage `GLOBAL_QUOTE` endpoint.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(settings: &OracleSettings) -> Result<Self, ApiError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(settings.timeout_ms))
                .build()?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl PriceOracle for AlphaVantageClient {
    async fn quote(&self, symbol: &str) -> Result<Quote, ApiError> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;
        let text = response.text().await?;

        parse_global_quote(symbol, &text)
    }
}

/// Turns a raw `GLOBAL_QUOTE` body into a `Quote`.
pub fn parse_global_quote(symbol: &str, body: &str) -> Result<Quote, ApiError> {
    let envelope: GlobalQuoteEnvelope =
        serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))?;

    if let Some(message) = envelope.error_message {
        return Err(ApiError::Provider(message));
    }
    if envelope.note.is_some() || envelope.information.is_some() {
        return Err(ApiError::RateLimited);
    }

    let quote = envelope.global_quote.unwrap_or_default();
    let raw_price = match quote.price {
        Some(price) if !price.trim().is_empty() => price,
        _ => return Err(ApiError::SymbolNotFound(symbol.to_string())),
    };
    let price = Decimal::from_str(raw_price.trim())
        .map_err(|e| ApiError::Deserialization(format!("price '{}': {}", raw_price, e)))?;

    // The trading day carries no time of day; fall back to now if it is missing.
    let as_of = quote
        .latest_trading_day
        .as_deref()
        .and_then(|day| NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").ok())
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        symbol: quote.symbol.unwrap_or_else(|| symbol.to_string()),
        price,
        as_of,
    })
}
