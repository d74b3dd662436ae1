//! Best-effort recording of executed trades.
//!
//! The journal runs after a trade has committed. Its failures are reported to the
//! caller as a value, never as a failed trade.

use configuration::JournalSettings;
use core_types::{NewLogEntry, OrderSide, TransactionLogEntry};
use database::{DbError, TransactionLog};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub initial_backoff: Duration,
}

impl From<&JournalSettings> for RetryPolicy {
    fn from(settings: &JournalSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

#[derive(Error, Debug)]
#[error("Failed to record {side} of {symbol} in the transaction log after {attempts} attempt(s): {source}")]
pub struct LogAppendError {
    pub side: OrderSide,
    pub symbol: String,
    pub attempts: u32,
    #[source]
    pub source: DbError,
}

pub struct TradeJournal {
    log: Arc<dyn TransactionLog>,
    policy: RetryPolicy,
}

impl TradeJournal {
    pub fn new(log: Arc<dyn TransactionLog>, policy: RetryPolicy) -> Self {
        Self { log, policy }
    }

    /// Appends `entry`, retrying with exponential backoff until the policy gives up.
    pub async fn record(&self, entry: NewLogEntry) -> Result<TransactionLogEntry, LogAppendError> {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.log.append(entry.clone()).await {
                Ok(recorded) => return Ok(recorded),
                Err(err) if attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        symbol = %entry.symbol,
                        side = %entry.side,
                        attempt,
                        error = %err,
                        "Transaction log append failed, retrying."
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    return Err(LogAppendError {
                        side: entry.side,
                        symbol: entry.symbol,
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}
