//! Escrow Ledger
//!
//! In-memory account ledger backing the claims arbitration engine.
//!
//! # Architecture
//!
//! - **Lazy accounts**: an address exists once it is credited; unknown
//!   addresses read as zero
//! - **Staged batches**: multi-step mutations are built in a
//!   [`LedgerBatch`] and installed with [`Ledger::apply`], or dropped
//! - **Exact arithmetic**: unsigned integer amounts, checked additions

#![forbid(unsafe_code)]
//!
//! # Invariants
//!
//! - Non-negativity: every balance is ≥ 0 after any operation sequence
//! - Money conservation: Σ(balances) == total supply for all time
//! - Transfers move value, never create or destroy it

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod ledger;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerBatch, WriteSet};
pub use types::{Address, Amount};
