//! # Portfolio Analytics
//!
//! Read models over the ledger. Nothing in this crate writes; every figure is
//! derived on demand from the open lots, the account row and the transaction log.
//!
//! ## Public API
//!
//! - `PositionAggregator`: groups open lots per symbol and marks them to market.
//! - `value_portfolio`: cash plus holdings, with the derived total value and return.
//! - `balance_history`: the cash balance over time, one point per trading day.
//! - `PortfolioService`: wires the stores and the oracle behind a per-user API.
//! - `AnalyticsError`: the specific error types that can be returned from this crate.

pub mod error;
pub mod history;
pub mod positions;
pub mod service;
pub mod valuation;

pub use error::AnalyticsError;
pub use history::{BalancePoint, balance_history};
pub use positions::PositionAggregator;
pub use service::{BalanceReport, PortfolioService};
pub use valuation::{PortfolioSummary, value_portfolio};
