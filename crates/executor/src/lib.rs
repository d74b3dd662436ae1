//! # Trade Executor Crate
//!
//! This crate provides the state machine that turns buy and sell orders into
//! ledger changes.
//!
//! ## Architectural Principles
//!
//! - **Plan, then Commit:** FIFO lot consumption is planned by a pure function
//!   (`plan_sale`) and handed to the store as a single `LedgerCommit`, so cash and
//!   lots always move together or not at all.
//! - **One Trade per User:** `UserLocks` serialises the read-modify-commit cycle
//!   per user; different users trade in parallel.
//! - **Source of Truth vs. Audit Trail:** the commit is final. The transaction log
//!   entry written afterwards is best effort with its own retry policy.
//!
//! ## Public API
//!
//! - `TradeExecutor`: `open_account`, `quote`, `buy`, `sell`.
//! - `BuyReceipt`, `SellReceipt`, `LotFill`: what a completed trade reports.
//! - `TradeError`, `LogAppendError`: the error types of this crate.

// Declare the modules that constitute this crate.
pub mod error;
pub mod fifo;
pub mod journal;
pub mod locks;
pub mod trade;

#[cfg(test)]
mod trade_tests;

// Re-export the key components to provide a clean, public-facing API.
pub use error::TradeError;
pub use fifo::{LotFill, SalePlan, plan_sale};
pub use journal::{LogAppendError, RetryPolicy, TradeJournal};
pub use locks::UserLocks;
pub use trade::{BuyReceipt, ExecutorSettings, SellReceipt, TradeExecutor};
