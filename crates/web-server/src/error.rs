use analytics::AnalyticsError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use database::DbError;
use executor::TradeError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Trade error: {0}")]
    Trade(#[from] TradeError),
    #[error("Portfolio error: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized. Please log in.")]
    Unauthorized,
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Trade(err) => match err {
                TradeError::Validation(_)
                | TradeError::InsufficientFunds { .. }
                | TradeError::InsufficientShares { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
                TradeError::QuoteUnavailable { .. } => {
                    tracing::warn!(error = %err, "Quote unavailable.");
                    (StatusCode::BAD_GATEWAY, err.to_string())
                }
                TradeError::AccountNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                TradeError::AccountExists(_) => (StatusCode::CONFLICT, err.to_string()),
                TradeError::Persistence(db_err) => {
                    tracing::error!(error = ?db_err, "Ledger persistence error.");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "The trade could not be saved. Please try again.".to_string(),
                    )
                }
            },
            AppError::Analytics(AnalyticsError::Store(DbError::AccountNotFound(user_id))) => (
                StatusCode::NOT_FOUND,
                format!("No account exists for user {}", user_id),
            ),
            AppError::Analytics(err) => {
                tracing::error!(error = ?err, "Portfolio read error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to load portfolio data".to_string(),
                )
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, AppError::Unauthorized.to_string()),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
