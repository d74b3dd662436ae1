use analytics::PortfolioService;
use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, DatabaseBackend, LoggingSettings, load_config};
use database::{LedgerStore, MemoryLedger, PgLedger, TransactionLog, connect, run_migrations};
use executor::{ExecutorSettings, TradeExecutor};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use web_server::AppState;

/// The main entry point for the paper trading ledger.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Migrate => handle_migrate(&config).await,
        command => {
            let app = build_app(&config).await?;
            run_command(command, app, &config).await
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A paper trading ledger: simulated buys and sells against live quotes, FIFO lots.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Apply database migrations and exit.
    Migrate,
    /// Open a paper account funded with the configured starting balance.
    OpenAccount(UserArgs),
    /// Buy shares at the current quote.
    Buy(TradeArgs),
    /// Sell shares at the current quote, consuming the oldest lots first.
    Sell(TradeArgs),
    /// List open positions marked to market.
    Positions(UserArgs),
    /// Show cash, holdings and total return.
    Summary(UserArgs),
    /// Show the cash balance over time.
    History(UserArgs),
    /// Fetch the current quote for a symbol.
    Quote(QuoteArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Overrides `server.host`.
    #[arg(long)]
    host: Option<String>,
    /// Overrides `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Parser)]
struct UserArgs {
    /// The account's user id.
    #[arg(long)]
    user: Uuid,
}

#[derive(Parser)]
struct TradeArgs {
    #[arg(long)]
    user: Uuid,
    /// The ticker symbol (e.g., "AAPL").
    #[arg(long)]
    symbol: String,
    /// Number of shares; fractional quantities are allowed.
    #[arg(long)]
    quantity: Decimal,
}

#[derive(Parser)]
struct QuoteArgs {
    #[arg(long)]
    symbol: String,
}

// ==============================================================================
// Startup
// ==============================================================================

/// Console output always; a daily-rolling file as well when `logging.directory` is set.
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(settings: &LoggingSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Invalid log level")?;

    let (file_layer, guard) = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();
    Ok(guard)
}

struct App {
    executor: Arc<TradeExecutor>,
    portfolio: Arc<PortfolioService>,
}

/// Hands one store to every component that needs a view of it.
fn wire<S>(store: Arc<S>, config: &Config) -> anyhow::Result<App>
where
    S: LedgerStore + TransactionLog + 'static,
{
    let oracle = api_client::build_oracle(&config.oracle)?;
    let settings = ExecutorSettings::from_config(config);
    let quote_timeout = Duration::from_millis(config.oracle.timeout_ms);

    let executor = TradeExecutor::new(store.clone(), store.clone(), oracle.clone(), settings);
    let portfolio = PortfolioService::new(store.clone(), store.clone(), store, oracle, quote_timeout);
    Ok(App {
        executor: Arc::new(executor),
        portfolio: Arc::new(portfolio),
    })
}

async fn build_app(config: &Config) -> anyhow::Result<App> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("database.url (or DATABASE_URL) is required for the postgres backend")?;
            let pool = connect(url, config.database.max_connections).await?;
            run_migrations(&pool).await?;
            tracing::info!("Connected to Postgres ledger.");
            wire(Arc::new(PgLedger::new(pool)), config)
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using the in-memory ledger; nothing survives a restart.");
            wire(Arc::new(MemoryLedger::new()), config)
        }
    }
}

async fn handle_migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("database.url (or DATABASE_URL) is required to run migrations")?;
    let pool = connect(url, 1).await?;
    run_migrations(&pool).await?;
    println!("Migrations applied.");
    Ok(())
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run_command(command: Commands, app: App, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Serve(args) => {
            let host = args.host.unwrap_or_else(|| config.server.host.clone());
            let port = args.port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
            let state = Arc::new(AppState {
                executor: app.executor,
                portfolio: app.portfolio,
            });
            web_server::run_server(addr, state).await?;
        }
        Commands::Migrate => handle_migrate(config).await?,
        Commands::OpenAccount(args) => {
            let account = app.executor.open_account(args.user).await?;
            println!(
                "Opened account {} with ${:.2}.",
                account.user_id, account.cash_balance
            );
        }
        Commands::Buy(args) => {
            let receipt = app.executor.buy(args.user, &args.symbol, args.quantity).await?;
            println!(
                "Bought {} {} at ${:.2} for ${:.2}. Cash: ${:.2}",
                receipt.quantity, receipt.symbol, receipt.price, receipt.total_cost, receipt.new_balance
            );
            if !receipt.logged {
                println!("Warning: the trade is final but was not written to the transaction log.");
            }
        }
        Commands::Sell(args) => {
            let receipt = app.executor.sell(args.user, &args.symbol, args.quantity).await?;
            println!(
                "Sold {} {} at ${:.2} for ${:.2} (average cost ${:.2}, P&L ${:.2}). Cash: ${:.2}",
                receipt.quantity,
                receipt.symbol,
                receipt.price,
                receipt.total_value,
                receipt.average_cost,
                receipt.profit_loss,
                receipt.new_balance
            );
            if !receipt.logged {
                println!("Warning: the trade is final but was not written to the transaction log.");
            }
        }
        Commands::Positions(args) => {
            let positions = app.portfolio.positions(args.user).await?;
            if positions.is_empty() {
                println!("No open positions.");
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec![
                "Symbol", "Quantity", "Avg Cost", "Price", "Value", "P&L", "P&L %",
            ]);
            for p in positions {
                let price = match p.quote_as_of {
                    Some(_) => format!("{:.2}", p.current_price),
                    None => format!("{:.2} (stale)", p.current_price),
                };
                table.add_row(vec![
                    p.symbol,
                    p.quantity.normalize().to_string(),
                    format!("{:.2}", p.average_cost),
                    price,
                    format!("{:.2}", p.market_value),
                    format!("{:.2}", p.profit_loss),
                    format!("{:.2}", p.profit_loss_percent),
                ]);
            }
            println!("{table}");
        }
        Commands::Summary(args) => {
            let summary = app.portfolio.summary(args.user).await?;
            println!("Cash:           ${:.2}", summary.cash_balance);
            println!("Holdings:       ${:.2}", summary.holdings_value);
            println!("Total value:    ${:.2}", summary.total_value);
            println!("Unrealized P&L: ${:.2}", summary.unrealized_profit_loss);
            println!("Total return:   {:.2}%", summary.total_return_percent);
        }
        Commands::History(args) => {
            let report = app.portfolio.balance_history(args.user).await?;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["Date", "Cash", "Portfolio Value"]);
            for point in report.balance_history {
                table.add_row(vec![
                    point.date.to_string(),
                    format!("{:.2}", point.cash_balance),
                    format!("{:.2}", point.portfolio_value),
                ]);
            }
            println!("{table}");
        }
        Commands::Quote(args) => {
            let quote = app.executor.quote(&args.symbol).await?;
            println!("{}: ${:.2} (as of {})", quote.symbol, quote.price, quote.as_of);
        }
    }
    Ok(())
}
