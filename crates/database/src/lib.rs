//! # Ledger Database Crate
//!
//! This crate is the system's record store for accounts, open lots and the
//! transaction log.
//!
//! ## Architectural Principles
//!
//! - **Store Traits:** `AccountStore`, `LotStore` and `TransactionLog` describe the
//!   persistence seams; `LedgerStore` adds the atomic `commit` that applies a whole
//!   trade (cash plus lots) as one unit.
//! - **Two Backends:** `PgLedger` runs on PostgreSQL through a pooled `sqlx`
//!   connection; `MemoryLedger` keeps everything in process with identical
//!   all-or-nothing semantics and injectable faults.
//! - **Guarded Writes:** every write in a commit names the value it expects to
//!   replace, so a commit built from a stale read fails instead of clobbering.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool setup and schema migration.
//! - `PgLedger`, `MemoryLedger`: the two store implementations.
//! - `LedgerCommit`, `LotChange`: the unit of change applied by `commit`.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryLedger;
pub use repository::PgLedger;
pub use store::{AccountStore, LedgerCommit, LedgerStore, LotChange, LotStore, TransactionLog};
