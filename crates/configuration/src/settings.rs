use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountSettings,
    pub oracle: OracleSettings,
    pub journal: JournalSettings,
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Parameters applied when a new paper-trading account is opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    /// Cash every account starts with.
    pub starting_balance: Decimal,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            starting_balance: dec!(100000.00),
        }
    }
}

/// Which price source backs the `PriceOracle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    #[default]
    AlphaVantage,
    /// Prices come from `static_prices` and never move on their own.
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub provider: OracleProvider,
    pub api_key: String,
    pub base_url: String,
    /// Upper bound on a single quote request. A timeout counts as no quote.
    pub timeout_ms: u64,
    pub static_prices: HashMap<String, Decimal>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            provider: OracleProvider::default(),
            api_key: "demo".to_string(),
            base_url: "https://www.alphavantage.co".to_string(),
            timeout_ms: 5_000,
            static_prices: HashMap::new(),
        }
    }
}

/// Retry policy for appending to the transaction log after a trade commits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    /// Process-local ledger. Everything is lost on exit.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    /// Falls back to the `DATABASE_URL` environment variable when unset.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
    /// Directory for daily-rolling log files. Console only when unset.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "papertrade.log".to_string(),
        }
    }
}

impl Config {
    /// Rejects settings the ledger cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.starting_balance.is_sign_negative() {
            return Err(ConfigError::ValidationError(format!(
                "account.starting_balance must not be negative, got {}",
                self.account.starting_balance
            )));
        }
        if self.oracle.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "oracle.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some((symbol, price)) = self
            .oracle
            .static_prices
            .iter()
            .find(|(_, price)| **price <= Decimal::ZERO)
        {
            return Err(ConfigError::ValidationError(format!(
                "oracle.static_prices.{} must be positive, got {}",
                symbol, price
            )));
        }
        if self.journal.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "journal.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.database.backend == DatabaseBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::ValidationError(
                "database.url (or DATABASE_URL) is required for the postgres backend".to_string(),
            ));
        }
        Ok(())
    }
}
