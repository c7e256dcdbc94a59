//! Configuration for the arbitration engine

use crate::{Error, Result};
use escrow_ledger::{Address, Amount};
use serde::{Deserialize, Serialize};

/// One whole token in the smallest unit (18 decimals)
const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Arbitration engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Protocol economics and epochs
    pub protocol: ProtocolConfig,

    /// Distinguished addresses
    pub addresses: AddressConfig,

    /// Proof recomputation schema
    pub proof: ProofConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "arbitration-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: ProtocolConfig::default(),
            addresses: AddressConfig::default(),
            proof: ProofConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Protocol economics and epochs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Exact collateral a claimant must lock
    pub collateral_amount: Amount,

    /// Exact stake a disputant must lock
    pub validator_staking: Amount,

    /// Reward paid from the pool to the winning party
    pub claim_incentive: Amount,

    /// Seconds an undisputed claim must age before timeout finalization
    pub claim_epoch_secs: u64,

    /// Seconds a dispute must age before timeout finalization
    pub dispute_epoch_secs: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            collateral_amount: ONE_TOKEN,
            validator_staking: 4 * ONE_TOKEN,
            claim_incentive: ONE_TOKEN / 2_000, // 0.0005 token
            claim_epoch_secs: 30,
            dispute_epoch_secs: 60,
        }
    }
}

/// Distinguished addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    /// Only sender allowed to report deposits
    pub portal: Address,

    /// Token accepted as deposit; anything else is refunded
    pub accepted_token: Address,

    /// Escrow account holding collateral and stakes
    pub locked_pool: Address,

    /// Destination of forfeited collateral
    pub treasury: Address,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            portal: Address::new("0x9C21AEb2093C32DDbC53eEF24B873BDCd1aDa1DB"),
            accepted_token: Address::new("0xc6e7DF5E7b4f2A278906862b61205850344D4e7d"),
            locked_pool: Address::new("0x0000000000000000000000000000000000000001"),
            treasury: Address::new("0x0000000000000000000000000000000000000002"),
        }
    }
}

/// Proof recomputation schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofConfig {
    /// Column holding the row type
    pub type_column: String,

    /// Row type kept for aggregation
    pub canonical_type: String,

    /// Grouping key column
    pub key_column: String,

    /// Numeric measure column
    pub measure_column: String,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            type_column: "type".to_string(),
            canonical_type: "Endpoint".to_string(),
            key_column: "sensor_id".to_string(),
            measure_column: "water_usage".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    ///
    /// Starts from `ARBITRATION_CONFIG` if set, otherwise from defaults, then
    /// applies individual overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("ARBITRATION_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };

        if let Ok(level) = std::env::var("ARBITRATION_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(portal) = std::env::var("ARBITRATION_PORTAL_ADDRESS") {
            config.addresses.portal = Address::new(portal);
        }

        if let Ok(token) = std::env::var("ARBITRATION_TOKEN_ADDRESS") {
            config.addresses.accepted_token = Address::new(token);
        }

        if let Ok(secs) = std::env::var("ARBITRATION_CLAIM_EPOCH_SECS") {
            config.protocol.claim_epoch_secs = parse_secs("ARBITRATION_CLAIM_EPOCH_SECS", &secs)?;
        }

        if let Ok(secs) = std::env::var("ARBITRATION_DISPUTE_EPOCH_SECS") {
            config.protocol.dispute_epoch_secs =
                parse_secs("ARBITRATION_DISPUTE_EPOCH_SECS", &secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        let protocol = &self.protocol;
        if protocol.collateral_amount == 0 {
            return Err(Error::Config("collateral_amount must be positive".to_string()));
        }
        if protocol.validator_staking == 0 {
            return Err(Error::Config("validator_staking must be positive".to_string()));
        }

        let addresses = &self.addresses;
        for (name, address) in [
            ("portal", &addresses.portal),
            ("accepted_token", &addresses.accepted_token),
            ("locked_pool", &addresses.locked_pool),
            ("treasury", &addresses.treasury),
        ] {
            if address.is_empty() {
                return Err(Error::Config(format!("{} address must be set", name)));
            }
        }
        if addresses.locked_pool == addresses.treasury {
            return Err(Error::Config(
                "locked_pool and treasury must be distinct accounts".to_string(),
            ));
        }

        let proof = &self.proof;
        for (name, value) in [
            ("type_column", &proof.type_column),
            ("canonical_type", &proof.canonical_type),
            ("key_column", &proof.key_column),
            ("measure_column", &proof.measure_column),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("proof.{} must not be empty", name)));
            }
        }

        Ok(())
    }
}

fn parse_secs(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{} is not a number of seconds: {}", var, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "arbitration-engine");
        assert_eq!(config.protocol.collateral_amount, 1_000_000_000_000_000_000);
        assert_eq!(config.protocol.validator_staking, 4_000_000_000_000_000_000);
        assert_eq!(config.protocol.claim_incentive, 500_000_000_000_000);
        assert_eq!(config.protocol.claim_epoch_secs, 30);
        assert_eq!(config.protocol.dispute_epoch_secs, 60);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_addresses_are_normalized() {
        let config = Config::default();
        assert_eq!(
            config.addresses.portal.as_str(),
            "0x9c21aeb2093c32ddbc53eef24b873bdcd1ada1db"
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
service_name = "arbitration-test"

[protocol]
claim_epoch_secs = 5

[addresses]
treasury = "0x00000000000000000000000000000000000000FE"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.service_name, "arbitration-test");
        assert_eq!(config.protocol.claim_epoch_secs, 5);
        assert_eq!(config.protocol.dispute_epoch_secs, 60);
        assert_eq!(
            config.addresses.treasury.as_str(),
            "0x00000000000000000000000000000000000000fe"
        );
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "protocol = 7").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_pool_and_treasury_must_differ() {
        let mut config = Config::default();
        config.addresses.treasury = config.addresses.locked_pool.clone();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_collateral_rejected() {
        let mut config = Config::default();
        config.protocol.collateral_amount = 0;
        assert!(config.validate().is_err());
    }
}
