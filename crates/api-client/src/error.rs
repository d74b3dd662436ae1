use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to deserialize response: {0}")]
    Deserialization(String),

    #[error("Quote provider error: {0}")]
    Provider(String),

    #[error("Quote provider rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Stock symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Quote for {symbol} timed out after {timeout_ms} ms")]
    Timeout { symbol: String, timeout_ms: u64 },

    #[error("Quote for {symbol} has a non-positive price: {price}")]
    InvalidPrice { symbol: String, price: Decimal },
}
