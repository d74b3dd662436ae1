use crate::error::ConfigError;
use config::{Environment, File, FileFormat};
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    AccountSettings, Config, DatabaseBackend, DatabaseSettings, JournalSettings, LoggingSettings,
    OracleProvider, OracleSettings, ServerSettings,
};

const ENV_PREFIX: &str = "PAPERTRADE";

/// Loads the application configuration from a TOML file.
///
/// The file is optional; every section has defaults. Environment variables of the
/// form `PAPERTRADE__SECTION__KEY` override file values, and `DATABASE_URL` fills
/// in `database.url` when neither source sets it.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    finish(builder, std::env::var("DATABASE_URL").ok())
}

/// Parses configuration from an in-memory TOML document. No environment lookups.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
    finish(builder, None)
}

fn finish(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    database_url: Option<String>,
) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let mut config = builder.build()?.try_deserialize::<Config>()?;

    if config.database.url.is_none() {
        config.database.url = database_url;
    }
    config.validate()?;

    tracing::debug!(
        oracle = ?config.oracle.provider,
        database = ?config.database.backend,
        "Configuration loaded."
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    // Key case depends on the source, so look prices up case-insensitively.
    fn static_price(config: &Config, symbol: &str) -> Option<Decimal> {
        config
            .oracle
            .static_prices
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(symbol))
            .map(|(_, price)| *price)
    }

    #[test]
    fn test_defaults_with_memory_backend() {
        let config = parse_config("[database]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(config.account.starting_balance, dec!(100000));
        assert_eq!(config.oracle.provider, OracleProvider::AlphaVantage);
        assert_eq!(config.oracle.timeout_ms, 5_000);
        assert_eq!(config.journal.max_attempts, 3);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_full_document() {
        let toml = r#"
            [account]
            starting_balance = "25000.50"

            [oracle]
            provider = "static"
            timeout_ms = 250

            [oracle.static_prices]
            AAPL = "150.25"
            MSFT = 310

            [journal]
            max_attempts = 5
            initial_backoff_ms = 10

            [database]
            backend = "postgres"
            url = "postgres://localhost/papertrade"
            max_connections = 4

            [server]
            port = 8080

            [logging]
            level = "debug"
            directory = "logs"
        "#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.account.starting_balance, dec!(25000.50));
        assert_eq!(config.oracle.provider, OracleProvider::Static);
        assert_eq!(static_price(&config, "aapl").unwrap(), dec!(150.25));
        assert_eq!(static_price(&config, "MSFT").unwrap(), dec!(310));
        assert_eq!(config.journal.max_attempts, 5);
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.directory.as_deref(), Some("logs"));
    }

    #[test]
    fn test_postgres_requires_url() {
        let err = parse_config("[account]\nstarting_balance = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_zero_timeout_and_bad_prices() {
        let zero_timeout = "[database]\nbackend = \"memory\"\n[oracle]\ntimeout_ms = 0\n";
        assert!(matches!(
            parse_config(zero_timeout),
            Err(ConfigError::ValidationError(_))
        ));

        let bad_price =
            "[database]\nbackend = \"memory\"\n[oracle.static_prices]\nAAPL = \"-1\"\n";
        assert!(matches!(
            parse_config(bad_price),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
