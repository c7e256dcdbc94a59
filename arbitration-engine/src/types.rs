//! Core types for claims arbitration
//!
//! Claim and user records are plain data; all mutation happens through the
//! registry and tracker batches owned by the engine.

use escrow_ledger::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Trigger time in integer seconds, carried by the trigger metadata
pub type Timestamp = u64;

/// Claim identifier (monotonic, starts at 1, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(u64);

impl ClaimId {
    /// First identifier handed out by a fresh registry
    pub const FIRST: ClaimId = ClaimId(1);

    /// Create from raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Identifier that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Collateral locked, awaiting dispute, timeout or proof
    Open,
    /// A disputant has staked against the claim
    Disputing,
    /// Claim timed out undisputed (terminal)
    Finalized,
    /// Dispute timed out without proof (terminal)
    Disputed,
    /// Proof recomputation matched (terminal)
    Validated,
    /// Proof recomputation did not match (terminal)
    Contradicted,
}

impl ClaimStatus {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Open => "OPEN",
            ClaimStatus::Disputing => "DISPUTING",
            ClaimStatus::Finalized => "FINALIZED",
            ClaimStatus::Disputed => "DISPUTED",
            ClaimStatus::Validated => "VALIDATED",
            ClaimStatus::Contradicted => "CONTRADICTED",
        }
    }

    /// Transition table: the status reached by applying `action`, if allowed
    pub fn next(&self, action: ClaimAction) -> Option<ClaimStatus> {
        use ClaimAction::*;
        use ClaimStatus::*;

        match (*self, action) {
            (Open, Dispute) => Some(Disputing),
            (Open, Timeout) => Some(Finalized),
            (Disputing, Timeout) => Some(Disputed),
            (Open | Disputing, ProveValid) => Some(Validated),
            (Open | Disputing, ProveInvalid) => Some(Contradicted),
            _ => None,
        }
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Open | ClaimStatus::Disputing)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action driving a claim transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimAction {
    /// A disputant stakes against the claim
    Dispute,
    /// The claim or dispute epoch elapsed
    Timeout,
    /// Recomputed proof matched the commitment
    ProveValid,
    /// Recomputed proof did not match the commitment
    ProveInvalid,
}

impl fmt::Display for ClaimAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimAction::Dispute => "dispute",
            ClaimAction::Timeout => "timeout",
            ClaimAction::ProveValid => "prove_valid",
            ClaimAction::ProveInvalid => "prove_invalid",
        };
        write!(f, "{}", name)
    }
}

/// Claim record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Claim identifier
    pub id: ClaimId,

    /// Party that locked the collateral
    pub claimant: Address,

    /// Party that staked against the claim (set once)
    pub disputant: Option<Address>,

    /// Content identifier of the off-chain input data
    #[serde(rename = "preparationCID")]
    pub preparation_cid: String,

    /// Content identifier of the off-chain computed output
    #[serde(rename = "computationCID")]
    pub computation_cid: String,

    /// Digest committed by the claimant
    pub proof_hash: String,

    /// Locked collateral
    pub collateral: Amount,

    /// Creation timestamp
    pub created_at: Timestamp,

    /// Timestamp of the last status change
    pub last_updated: Timestamp,

    /// Current status
    pub status: ClaimStatus,
}

impl Claim {
    /// True while the claim can still move
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Per-address participation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Owner address
    pub address: Address,

    /// Undisputed claims awaiting resolution
    pub open_claims: BTreeSet<ClaimId>,

    /// Disputed claims awaiting resolution (either side)
    pub open_disputes: BTreeSet<ClaimId>,

    /// Claims resolved as claimant
    pub total_claims: u64,

    /// Claims resolved in the claimant's favour
    pub correct_claims: u64,

    /// Disputes resolved (either side)
    pub total_disputes: u64,

    /// Disputes resolved in this user's favour
    pub won_disputes: u64,
}

impl UserRecord {
    /// Create an empty record
    pub fn new(address: Address) -> Self {
        Self {
            address,
            open_claims: BTreeSet::new(),
            open_disputes: BTreeSet::new(),
            total_claims: 0,
            correct_claims: 0,
            total_disputes: 0,
            won_disputes: 0,
        }
    }
}

/// Instruction for the boundary layer to move funds out of the escrow domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransfer {
    /// Recipient outside the escrow domain
    #[serde(rename = "destinationAddress")]
    pub destination: Address,

    /// Token contract the funds are denominated in
    #[serde(rename = "tokenReference")]
    pub token: Address,

    /// Amount to pay out
    pub amount: Amount,
}
