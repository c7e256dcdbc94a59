//! Core types for the escrow ledger
//!
//! All types are designed for:
//! - Deterministic ordering (addresses sort byte-wise)
//! - Exact arithmetic (unsigned integers in the smallest unit)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in the smallest indivisible unit.
///
/// Unsigned, so a balance can never be observed below zero.
pub type Amount = u128;

/// Account address (case-normalized)
///
/// Two spellings of the same hex address (`0xAbC…` and `0xabc…`) refer to
/// the same account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create new address, trimming whitespace and lowercasing ASCII
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_lowercase())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the address is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
