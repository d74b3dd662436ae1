use serde::Deserialize;

/// The envelope Alpha Vantage wraps around a `GLOBAL_QUOTE` answer.
///
/// Errors and throttling come back as HTTP 200 with one of the message fields set
/// instead of the quote.
#[derive(Debug, Deserialize)]
pub struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote")]
    pub global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
}

/// The fields of a global quote we read. Alpha Vantage sends every value as a string.
#[derive(Debug, Default, Deserialize)]
pub struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "05. price")]
    pub price: Option<String>,
    #[serde(rename = "07. latest trading day")]
    pub latest_trading_day: Option<String>,
}
