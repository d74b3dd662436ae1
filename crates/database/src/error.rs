use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("No account exists for user {0}")]
    AccountNotFound(Uuid),

    #[error("An account already exists for user {0}")]
    AccountExists(Uuid),

    #[error("Lot {0} was not found")]
    LotNotFound(Uuid),

    #[error("Concurrent modification detected: {0}")]
    Conflict(String),

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Stored row could not be decoded: {0}")]
    InvalidRow(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}
