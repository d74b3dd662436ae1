//! # Core Types
//!
//! Shared domain vocabulary for the paper-trading ledger: accounts, lots, quotes,
//! derived positions and transaction log entries, plus the input normalisation
//! every entry point applies before touching the ledger.

pub mod enums;
pub mod error;
pub mod structs;
pub mod validation;

// Re-export the core types to provide a clean public API.
pub use enums::OrderSide;
pub use error::CoreError;
pub use structs::{Account, Lot, NewLogEntry, NewLot, Position, Quote, TransactionLogEntry};
pub use validation::{normalize_symbol, quantity_from_f64, validate_quantity};
