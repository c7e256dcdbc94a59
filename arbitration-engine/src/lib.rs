//! Arbitration Engine
//!
//! Escrow-backed claims arbitration: claimants lock collateral behind a
//! committed result, disputants stake against it, and claims resolve by
//! timeout or by recomputing the proof from submitted telemetry.
//!
//! # Architecture

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
//!
//! Triggers arrive one at a time from an ordered source:
//!
//! 1. **Preconditions**: checked in a fixed order, aborting on the first failure
//! 2. **Staging**: ledger, registry and user changes are staged in one transaction
//! 3. **Commit**: the combined write set is applied, or dropped on error
//! 4. **Outcome**: accepted triggers may carry payout instructions for the host
//!
//! # Claim lifecycle
//!
//! - OPEN → DISPUTING on dispute, FINALIZED on timeout
//! - OPEN or DISPUTING → VALIDATED or CONTRADICTED on proof recomputation
//! - DISPUTING → DISPUTED on timeout
//!
//! # Example
//!
//! ```
//! use arbitration_engine::{Action, ArbitrationEngine, Config, Trigger, WithdrawPayload};
//!
//! let mut engine = ArbitrationEngine::new(Config::default())?;
//! let outcome = engine.process(&Trigger::new(
//!     "0xA11CE",
//!     0,
//!     Action::Withdraw(WithdrawPayload { amount: 1 }),
//! ));
//! assert!(!outcome.is_accepted());
//! # Ok::<(), arbitration_engine::Error>(())
//! ```

#![warn(missing_debug_implementations, clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod proof;
pub mod registry;
pub mod trigger;
pub mod types;
pub mod users;

// Re-exports
pub use config::Config;
pub use engine::{ArbitrationEngine, EngineState};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use proof::ProofVerifier;
pub use registry::ClaimRegistry;
pub use trigger::*;
pub use types::*;
pub use users::UserStatsTracker;
