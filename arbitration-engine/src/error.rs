//! Error types for the arbitration engine
//!
//! Every variant is a rejection: the trigger that produced it left no state
//! change behind. A proof that fails to reproduce the committed digest is
//! not an error; it resolves the claim as CONTRADICTED.

use crate::types::{ClaimAction, ClaimId, ClaimStatus};
use escrow_ledger::{Address, Amount};
use thiserror::Error;

/// Result type for arbitration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Arbitration errors
#[derive(Error, Debug)]
pub enum Error {
    /// Zero amount, or collateral/stake differing from the required amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Balance too low for the requested debit
    #[error("Insufficient funds for {address}: required {required}, available {available}")]
    InsufficientFunds {
        /// Account being debited
        address: Address,
        /// Amount requested
        required: Amount,
        /// Balance at the time of the request
        available: Amount,
    },

    /// No claim with this identifier
    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// A live claim already references this preparation CID
    #[error("Claim already exists for preparation CID {0}")]
    DuplicateClaim(String),

    /// The trigger names a preparation CID other than the claim's
    #[error("Claim {claim_id} preparation CID mismatch: expected {expected}, found {found}")]
    PreparationMismatch {
        /// Claim addressed by the trigger
        claim_id: ClaimId,
        /// CID carried by the trigger
        expected: String,
        /// CID stored on the claim
        found: String,
    },

    /// Status does not allow the requested action
    #[error("Claim {claim_id} in status {status} does not allow {action}")]
    InvalidTransition {
        /// Claim addressed by the trigger
        claim_id: ClaimId,
        /// Current status
        status: ClaimStatus,
        /// Rejected action
        action: ClaimAction,
    },

    /// Epoch has not yet elapsed
    #[error("Claim {claim_id} can't be finalized yet, {remaining} more seconds to go")]
    TooEarly {
        /// Claim addressed by the trigger
        claim_id: ClaimId,
        /// Seconds until finalization is permitted
        remaining: u64,
    },

    /// Sender is not allowed to perform this action
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Claimant attempted to dispute their own claim
    #[error("Cannot dispute own claim {0}")]
    SelfDispute(ClaimId),

    /// Malformed trigger payload or telemetry
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Invariant violation (money conservation, overflow, index drift)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<escrow_ledger::Error> for Error {
    fn from(err: escrow_ledger::Error) -> Self {
        match err {
            escrow_ledger::Error::InvalidAmount(msg) => Error::InvalidAmount(msg),
            escrow_ledger::Error::InsufficientFunds {
                address,
                required,
                available,
            } => Error::InsufficientFunds {
                address,
                required,
                available,
            },
            escrow_ledger::Error::InvariantViolation(msg) => Error::InvariantViolation(msg),
        }
    }
}

impl Error {
    /// Short machine-readable name of the rejection kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::ClaimNotFound(_) => "claim_not_found",
            Error::DuplicateClaim(_) => "duplicate_claim",
            Error::PreparationMismatch { .. } => "preparation_mismatch",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::TooEarly { .. } => "too_early",
            Error::Unauthorized(_) => "unauthorized",
            Error::SelfDispute(_) => "self_dispute",
            Error::InvalidPayload(_) => "invalid_payload",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}
