//! Proof recomputation
//!
//! Telemetry arrives as CSV with a header row. The canonical form keeps the
//! rows of one type, sums the measure per key as an exact decimal, orders
//! the groups by key and writes them as headerless `key,total` lines. The
//! commitment is the lowercase hex SHA-256 of that text.

use crate::{config::ProofConfig, Error, Result};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Recomputes and checks claim commitments
#[derive(Debug, Clone)]
pub struct ProofVerifier {
    config: ProofConfig,
}

impl ProofVerifier {
    /// Create a verifier for the given column schema
    pub fn new(config: ProofConfig) -> Self {
        Self { config }
    }

    /// Canonical aggregate of the payload
    pub fn canonicalize(&self, raw: &str) -> Result<String> {
        let totals = self.aggregate(raw)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        for (key, total) in &totals {
            let total = render_total(*total);
            writer
                .write_record([key.as_str(), total.as_str()])
                .map_err(|e| Error::InvalidPayload(format!("Failed to write canonical row: {}", e)))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::InvalidPayload(format!("Failed to flush canonical rows: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::InvalidPayload(format!("Canonical form is not UTF-8: {}", e)))
    }

    /// Commitment digest of the payload
    pub fn digest(&self, raw: &str) -> Result<String> {
        let canonical = self.canonicalize(raw)?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// True iff the payload reproduces `expected` exactly
    pub fn verify(&self, raw: &str, expected: &str) -> Result<bool> {
        let digest = self.digest(raw)?;
        let matched = digest == expected;
        if !matched {
            tracing::debug!("Proof digest {} does not match commitment {}", digest, expected);
        }
        Ok(matched)
    }

    fn aggregate(&self, raw: &str) -> Result<BTreeMap<String, Decimal>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| Error::InvalidPayload(format!("Unreadable header row: {}", e)))?
            .clone();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::InvalidPayload(format!("Missing column '{}'", name)))
        };
        let type_idx = column(&self.config.type_column)?;
        let key_idx = column(&self.config.key_column)?;
        let measure_idx = column(&self.config.measure_column)?;

        let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for (line, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| Error::InvalidPayload(format!("Malformed row {}: {}", line + 1, e)))?;

            if record.get(type_idx) != Some(self.config.canonical_type.as_str()) {
                continue;
            }

            let key = record.get(key_idx).unwrap_or_default();
            let measure = record.get(measure_idx).unwrap_or_default();
            let value = parse_measure(measure).ok_or_else(|| {
                Error::InvalidPayload(format!(
                    "Row {}: '{}' is not a number in column '{}'",
                    line + 1,
                    measure,
                    self.config.measure_column
                ))
            })?;

            let total = totals.entry(key.to_string()).or_insert(Decimal::ZERO);
            *total = total.checked_add(value).ok_or_else(|| {
                Error::InvalidPayload(format!("Total for '{}' overflows", key))
            })?;
        }

        Ok(totals)
    }
}

fn parse_measure(value: &str) -> Option<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

/// Trailing zeros stripped, at least one fractional digit
fn render_total(total: Decimal) -> String {
    let normalized = total.normalize();
    if normalized.scale() == 0 {
        format!("{}.0", normalized)
    } else {
        normalized.to_string()
    }
}
