use crate::{AppState, error::AppError, identity::UserId};
use analytics::PortfolioSummary;
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use core_types::{Account, quantity_from_f64};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub quantity: QuantityInput,
}

/// Share counts arrive either as a JSON number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QuantityInput {
    Number(f64),
    Text(String),
}

impl QuantityInput {
    fn to_quantity(&self) -> Result<Decimal, AppError> {
        let value = match self {
            QuantityInput::Number(value) => Some(*value),
            QuantityInput::Text(text) => text.trim().parse::<f64>().ok(),
        };
        value
            .and_then(|value| quantity_from_f64(value).ok())
            .ok_or_else(|| AppError::BadRequest("Valid quantity (number of shares) is required".to_string()))
    }
}

/// Unwraps a JSON body, turning axum's rejection into our `{ "error": ... }` shape.
fn trade_request(
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<(TradeRequest, Decimal), AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let quantity = request.quantity.to_quantity()?;
    Ok((request, quantity))
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub symbol: Option<String>,
}

/// # POST /api/accounts
/// Opens a paper account for the caller with the configured starting balance.
pub async fn open_account(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state.executor.open_account(user_id).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// # POST /api/stocks/buy
pub async fn buy_stock(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let (request, quantity) = trade_request(payload)?;
    let receipt = state.executor.buy(user_id, &request.symbol, quantity).await?;
    let message = format!(
        "Successfully purchased {} shares of {} at ${:.2} per share",
        receipt.quantity, receipt.symbol, receipt.price
    );
    Ok(Json(json!({ "success": true, "message": message, "purchase": receipt })))
}

/// # POST /api/stocks/sell
pub async fn sell_stock(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let (request, quantity) = trade_request(payload)?;
    let receipt = state.executor.sell(user_id, &request.symbol, quantity).await?;
    let message = format!(
        "Successfully sold {} shares of {} at ${:.2} per share",
        receipt.quantity, receipt.symbol, receipt.price
    );
    Ok(Json(json!({ "success": true, "message": message, "sale": receipt })))
}

/// # GET /api/stocks/quote?symbol=
pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Value>, AppError> {
    let symbol = params
        .symbol
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Symbol parameter is required".to_string()))?;
    let quote = state.executor.quote(&symbol).await?;
    Ok(Json(json!({ "quote": quote })))
}

/// # GET /api/positions
pub async fn get_positions(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Value>, AppError> {
    let positions = state.portfolio.positions(user_id).await?;
    Ok(Json(json!({ "positions": positions })))
}

/// # GET /api/portfolio/summary
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<PortfolioSummary>, AppError> {
    Ok(Json(state.portfolio.summary(user_id).await?))
}

/// # GET /api/portfolio/balance
/// Cash balance over time plus today's marked-to-market total.
pub async fn get_balance_history(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<analytics::BalanceReport>, AppError> {
    Ok(Json(state.portfolio.balance_history(user_id).await?))
}

/// # GET /api/transactions
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Value>, AppError> {
    let transactions = state.portfolio.transactions(user_id).await?;
    Ok(Json(json!({ "transactions": transactions })))
}
