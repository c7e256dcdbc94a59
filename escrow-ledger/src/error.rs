//! Error types for the escrow ledger

use crate::types::{Address, Amount};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Zero-valued deposit, withdrawal or transfer
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit larger than the available balance
    #[error("Insufficient funds for {address}: required {required}, available {available}")]
    InsufficientFunds {
        /// Account being debited
        address: Address,
        /// Amount requested
        required: Amount,
        /// Balance at the time of the request
        available: Amount,
    },

    /// Invariant violation (money conservation, arithmetic overflow)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
