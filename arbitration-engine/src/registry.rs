//! Claim registry
//!
//! Holds every claim ever created plus an index from preparation CID to the
//! single live claim that references it. Mutations are staged on a
//! [`RegistryBatch`] and installed with [`ClaimRegistry::apply`]; every
//! status change is checked against [`ClaimStatus::next`] in one place.

use crate::{
    types::{Claim, ClaimAction, ClaimId, ClaimStatus, Timestamp},
    Error, Result,
};
use escrow_ledger::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Committed claim state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRegistry {
    /// All claims by id; never deleted
    claims: BTreeMap<ClaimId, Claim>,

    /// Preparation CID → live claim
    live_by_preparation_cid: BTreeMap<String, ClaimId>,

    /// Identifier for the next created claim
    next_id: ClaimId,
}

impl Default for ClaimRegistry {
    fn default() -> Self {
        Self {
            claims: BTreeMap::new(),
            live_by_preparation_cid: BTreeMap::new(),
            next_id: ClaimId::FIRST,
        }
    }
}

impl ClaimRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get claim by id
    pub fn get(&self, id: ClaimId) -> Option<&Claim> {
        self.claims.get(&id)
    }

    /// Live claim bound to a preparation CID
    pub fn lookup_by_preparation_cid(&self, cid: &str) -> Option<&Claim> {
        self.live_by_preparation_cid
            .get(cid)
            .and_then(|id| self.claims.get(id))
    }

    /// All claims in id order
    pub fn iter(&self) -> impl Iterator<Item = &Claim> + '_ {
        self.claims.values()
    }

    /// Number of claims ever created
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True if no claim was ever created
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Number of non-terminal claims
    pub fn live_count(&self) -> usize {
        self.live_by_preparation_cid.len()
    }

    /// Open a staged batch over the committed claims
    pub fn batch(&self) -> RegistryBatch<'_> {
        RegistryBatch {
            base: self,
            staged: BTreeMap::new(),
            index: BTreeMap::new(),
            next_id: self.next_id,
        }
    }

    /// Install a finished batch
    pub fn apply(&mut self, write_set: RegistryWriteSet) {
        for (id, claim) in write_set.claims {
            self.claims.insert(id, claim);
        }
        for (cid, binding) in write_set.index {
            match binding {
                Some(id) => {
                    self.live_by_preparation_cid.insert(cid, id);
                }
                None => {
                    self.live_by_preparation_cid.remove(&cid);
                }
            }
        }
        self.next_id = write_set.next_id;
    }

    /// Check the CID index covers exactly the live claims
    pub fn check_index(&self) -> Result<()> {
        for (cid, id) in &self.live_by_preparation_cid {
            match self.claims.get(id) {
                Some(claim) if claim.is_live() && &claim.preparation_cid == cid => {}
                _ => {
                    return Err(Error::InvariantViolation(format!(
                        "preparation CID {} indexed to claim {} which is not live",
                        cid, id
                    )))
                }
            }
        }

        let live = self.claims.values().filter(|c| c.is_live()).count();
        if live != self.live_by_preparation_cid.len() {
            return Err(Error::InvariantViolation(format!(
                "{} live claims but {} indexed preparation CIDs",
                live,
                self.live_by_preparation_cid.len()
            )));
        }

        Ok(())
    }
}

/// Staged claim changes over a committed [`ClaimRegistry`]
#[derive(Debug)]
pub struct RegistryBatch<'a> {
    base: &'a ClaimRegistry,
    staged: BTreeMap<ClaimId, Claim>,
    index: BTreeMap<String, Option<ClaimId>>,
    next_id: ClaimId,
}

impl<'a> RegistryBatch<'a> {
    /// Claim as seen through this batch
    pub fn get(&self, id: ClaimId) -> Option<&Claim> {
        self.staged.get(&id).or_else(|| self.base.get(id))
    }

    /// Live claim bound to a preparation CID, as seen through this batch
    pub fn lookup_by_preparation_cid(&self, cid: &str) -> Option<&Claim> {
        let id = match self.index.get(cid) {
            Some(binding) => *binding,
            None => self.base.live_by_preparation_cid.get(cid).copied(),
        }?;
        self.get(id)
    }

    /// Register a new OPEN claim
    pub fn create(
        &mut self,
        claimant: &Address,
        preparation_cid: &str,
        computation_cid: &str,
        proof_hash: &str,
        collateral: Amount,
        timestamp: Timestamp,
    ) -> Result<Claim> {
        if let Some(existing) = self.lookup_by_preparation_cid(preparation_cid) {
            tracing::debug!(
                "Preparation CID {} already bound to live claim {}",
                preparation_cid,
                existing.id
            );
            return Err(Error::DuplicateClaim(preparation_cid.to_string()));
        }

        let id = self.next_id;
        self.next_id = id.next();

        let claim = Claim {
            id,
            claimant: claimant.clone(),
            disputant: None,
            preparation_cid: preparation_cid.to_string(),
            computation_cid: computation_cid.to_string(),
            proof_hash: proof_hash.to_string(),
            collateral,
            created_at: timestamp,
            last_updated: timestamp,
            status: ClaimStatus::Open,
        };

        self.staged.insert(id, claim.clone());
        self.index.insert(preparation_cid.to_string(), Some(id));
        Ok(claim)
    }

    /// OPEN → DISPUTING
    pub fn initiate_dispute(
        &mut self,
        id: ClaimId,
        disputant: &Address,
        timestamp: Timestamp,
    ) -> Result<Claim> {
        let claim = self.get(id).ok_or(Error::ClaimNotFound(id))?;
        let next = next_status(claim, ClaimAction::Dispute)?;
        if &claim.claimant == disputant {
            return Err(Error::SelfDispute(id));
        }

        let claim = self.stage_claim(id)?;
        claim.disputant = Some(disputant.clone());
        claim.status = next;
        claim.last_updated = timestamp;
        Ok(claim.clone())
    }

    /// OPEN → FINALIZED or DISPUTING → DISPUTED once the epoch has elapsed
    pub fn finalize_by_timeout(
        &mut self,
        id: ClaimId,
        now: Timestamp,
        claim_epoch: u64,
        dispute_epoch: u64,
    ) -> Result<Claim> {
        let claim = self.get(id).ok_or(Error::ClaimNotFound(id))?;
        let next = next_status(claim, ClaimAction::Timeout)?;

        let epoch = match claim.status {
            ClaimStatus::Open => claim_epoch,
            _ => dispute_epoch,
        };
        let deadline = claim.last_updated.saturating_add(epoch);
        if now < deadline {
            return Err(Error::TooEarly {
                claim_id: id,
                remaining: deadline - now,
            });
        }

        self.advance(id, next, now)
    }

    /// OPEN/DISPUTING → VALIDATED or CONTRADICTED
    pub fn resolve_by_proof(&mut self, id: ClaimId, matched: bool, now: Timestamp) -> Result<Claim> {
        let claim = self.get(id).ok_or(Error::ClaimNotFound(id))?;
        let action = if matched {
            ClaimAction::ProveValid
        } else {
            ClaimAction::ProveInvalid
        };
        let next = next_status(claim, action)?;

        self.advance(id, next, now)
    }

    /// Seal the batch into an owned write set
    pub fn finish(self) -> RegistryWriteSet {
        RegistryWriteSet {
            claims: self.staged,
            index: self.index,
            next_id: self.next_id,
        }
    }

    fn advance(&mut self, id: ClaimId, next: ClaimStatus, now: Timestamp) -> Result<Claim> {
        let claim = self.stage_claim(id)?;
        claim.status = next;
        claim.last_updated = now;
        let claim = claim.clone();

        if claim.status.is_terminal() {
            self.index.insert(claim.preparation_cid.clone(), None);
        }
        Ok(claim)
    }

    fn stage_claim(&mut self, id: ClaimId) -> Result<&mut Claim> {
        match self.staged.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let claim = self.base.get(id).cloned().ok_or(Error::ClaimNotFound(id))?;
                Ok(entry.insert(claim))
            }
        }
    }
}

/// Sealed claim changes ready to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryWriteSet {
    claims: BTreeMap<ClaimId, Claim>,
    index: BTreeMap<String, Option<ClaimId>>,
    next_id: ClaimId,
}

fn next_status(claim: &Claim, action: ClaimAction) -> Result<ClaimStatus> {
    claim.status.next(action).ok_or(Error::InvalidTransition {
        claim_id: claim.id,
        status: claim.status,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::new("0xA11CE")
    }

    fn bob() -> Address {
        Address::new("0xB0B")
    }

    fn open_claim(registry: &mut ClaimRegistry, cid: &str, at: Timestamp) -> ClaimId {
        let mut batch = registry.batch();
        let claim = batch.create(&alice(), cid, "comp", "hash", 10, at).unwrap();
        let write_set = batch.finish();
        registry.apply(write_set);
        claim.id
    }

    #[test]
    fn test_create_assigns_monotonic_ids() {
        let mut registry = ClaimRegistry::new();
        assert_eq!(open_claim(&mut registry, "p1", 0), ClaimId::new(1));
        assert_eq!(open_claim(&mut registry, "p2", 0), ClaimId::new(2));

        let claim = registry.get(ClaimId::new(2)).unwrap();
        assert_eq!(claim.status, ClaimStatus::Open);
        assert_eq!(claim.last_updated, 0);
        registry.check_index().unwrap();
    }

    #[test]
    fn test_duplicate_live_cid_rejected() {
        let mut registry = ClaimRegistry::new();
        open_claim(&mut registry, "p1", 0);

        let mut batch = registry.batch();
        let err = batch.create(&bob(), "p1", "c", "h", 10, 1).unwrap_err();
        assert!(matches!(err, Error::DuplicateClaim(cid) if cid == "p1"));
    }

    #[test]
    fn test_duplicate_within_one_batch_rejected() {
        let registry = ClaimRegistry::new();
        let mut batch = registry.batch();
        batch.create(&alice(), "p1", "c", "h", 10, 0).unwrap();
        assert!(batch.create(&bob(), "p1", "c", "h", 10, 0).is_err());
    }

    #[test]
    fn test_cid_reusable_after_terminal() {
        let mut registry = ClaimRegistry::new();
        let id = open_claim(&mut registry, "p1", 0);

        let mut batch = registry.batch();
        batch.finalize_by_timeout(id, 30, 30, 60).unwrap();
        let write_set = batch.finish();
        registry.apply(write_set);
        assert!(registry.lookup_by_preparation_cid("p1").is_none());

        let second = open_claim(&mut registry, "p1", 31);
        assert_eq!(second, ClaimId::new(2));
        assert_eq!(registry.lookup_by_preparation_cid("p1").unwrap().id, second);
        registry.check_index().unwrap();
    }

    #[test]
    fn test_initiate_dispute_checks() {
        let mut registry = ClaimRegistry::new();
        let id = open_claim(&mut registry, "p1", 0);

        let mut batch = registry.batch();
        assert!(matches!(
            batch.initiate_dispute(ClaimId::new(99), &bob(), 1),
            Err(Error::ClaimNotFound(_))
        ));
        assert!(matches!(
            batch.initiate_dispute(id, &alice(), 1),
            Err(Error::SelfDispute(_))
        ));

        let claim = batch.initiate_dispute(id, &bob(), 5).unwrap();
        assert_eq!(claim.status, ClaimStatus::Disputing);
        assert_eq!(claim.disputant, Some(bob()));
        assert_eq!(claim.last_updated, 5);

        // Second dispute on the same claim is a disallowed transition
        assert!(matches!(
            batch.initiate_dispute(id, &Address::new("0xC"), 6),
            Err(Error::InvalidTransition { status: ClaimStatus::Disputing, .. })
        ));
    }

    #[test]
    fn test_finalize_too_early_reports_remaining() {
        let mut registry = ClaimRegistry::new();
        let id = open_claim(&mut registry, "p1", 0);

        let mut batch = registry.batch();
        let err = batch.finalize_by_timeout(id, 29, 30, 60).unwrap_err();
        assert!(matches!(err, Error::TooEarly { remaining: 1, .. }));

        let claim = batch.finalize_by_timeout(id, 30, 30, 60).unwrap();
        assert_eq!(claim.status, ClaimStatus::Finalized);
        assert_eq!(claim.last_updated, 30);
    }

    #[test]
    fn test_disputed_claim_uses_dispute_epoch() {
        let mut registry = ClaimRegistry::new();
        let id = open_claim(&mut registry, "p1", 0);

        let mut batch = registry.batch();
        batch.initiate_dispute(id, &bob(), 10).unwrap();
        let err = batch.finalize_by_timeout(id, 69, 30, 60).unwrap_err();
        assert!(matches!(err, Error::TooEarly { remaining: 1, .. }));

        let claim = batch.finalize_by_timeout(id, 70, 30, 60).unwrap();
        assert_eq!(claim.status, ClaimStatus::Disputed);
    }

    #[test]
    fn test_terminal_claims_reject_everything() {
        let mut registry = ClaimRegistry::new();
        let id = open_claim(&mut registry, "p1", 0);

        let mut batch = registry.batch();
        batch.resolve_by_proof(id, true, 1).unwrap();
        let write_set = batch.finish();
        registry.apply(write_set);

        let mut batch = registry.batch();
        assert!(matches!(
            batch.resolve_by_proof(id, false, 2),
            Err(Error::InvalidTransition { status: ClaimStatus::Validated, .. })
        ));
        assert!(matches!(
            batch.finalize_by_timeout(id, 1_000, 30, 60),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            batch.initiate_dispute(id, &bob(), 3),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_dropped_batch_leaves_registry_untouched() {
        let mut registry = ClaimRegistry::new();
        let id = open_claim(&mut registry, "p1", 0);
        let before = registry.clone();

        {
            let mut batch = registry.batch();
            batch.initiate_dispute(id, &bob(), 3).unwrap();
            batch.create(&bob(), "p2", "c", "h", 10, 3).unwrap();
        }

        assert_eq!(registry, before);
    }
}
