use analytics::PortfolioService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use executor::TradeExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod identity;


/// The shared application state that all handlers can access.
pub struct AppState {
    pub executor: Arc<TradeExecutor>,
    pub portfolio: Arc<PortfolioService>,
}

/// Builds the API router. Split from `run_server` so tests can drive it directly.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any());

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/accounts", post(handlers::open_account))
        .route("/api/stocks/buy", post(handlers::buy_stock))
        .route("/api/stocks/sell", post(handlers::sell_stock))
        .route("/api/stocks/quote", get(handlers::get_quote))
        .route("/api/positions", get(handlers::get_positions))
        .route("/api/portfolio/summary", get(handlers::get_summary))
        .route("/api/portfolio/balance", get(handlers::get_balance_history))
        .route("/api/transactions", get(handlers::get_transactions))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
}

/// The main function to configure and run the web server.
pub async fn run_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    tracing::info!("Web server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
