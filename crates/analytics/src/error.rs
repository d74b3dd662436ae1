use database::DbError;
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Failed to read portfolio data: {0}")]
    Store(#[from] DbError),

    #[error("Error in calculation: {0}")]
    Calculation(String),
}

impl AnalyticsError {
    /// A figure that does not fit in a `Decimal`.
    pub(crate) fn out_of_range(what: impl Display) -> Self {
        AnalyticsError::Calculation(format!("{} is out of range", what))
    }
}
