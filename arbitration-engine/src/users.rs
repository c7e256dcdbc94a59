//! Per-address participation statistics
//!
//! Records are only touched through named mutations on a [`UsersBatch`];
//! there is no generic field setter.

use crate::types::{ClaimId, UserRecord};
use escrow_ledger::Address;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Committed user records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatsTracker {
    users: BTreeMap<Address, UserRecord>,
}

impl UserStatsTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Get record by address
    pub fn get(&self, address: &Address) -> Option<&UserRecord> {
        self.users.get(address)
    }

    /// All records in address order
    pub fn iter(&self) -> impl Iterator<Item = &UserRecord> + '_ {
        self.users.values()
    }

    /// Number of known users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True if no user is known
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Open a staged batch over the committed records
    pub fn batch(&self) -> UsersBatch<'_> {
        UsersBatch {
            base: self,
            staged: BTreeMap::new(),
        }
    }

    /// Install a finished batch
    pub fn apply(&mut self, write_set: UsersWriteSet) {
        for (address, record) in write_set.records {
            self.users.insert(address, record);
        }
    }
}

/// Staged record changes over a committed [`UserStatsTracker`]
#[derive(Debug)]
pub struct UsersBatch<'a> {
    base: &'a UserStatsTracker,
    staged: BTreeMap<Address, UserRecord>,
}

impl<'a> UsersBatch<'a> {
    /// Record as seen through this batch
    pub fn get(&self, address: &Address) -> Option<&UserRecord> {
        self.staged.get(address).or_else(|| self.base.get(address))
    }

    /// Create a zeroed record if absent
    pub fn ensure_user(&mut self, address: &Address) {
        self.record_mut(address);
    }

    /// Track a freshly opened claim
    pub fn open_claim(&mut self, claimant: &Address, id: ClaimId) {
        self.record_mut(claimant).open_claims.insert(id);
    }

    /// Move a claim into the disputed set on both sides
    pub fn open_dispute(&mut self, claimant: &Address, disputant: &Address, id: ClaimId) {
        let record = self.record_mut(claimant);
        record.open_claims.remove(&id);
        record.open_disputes.insert(id);

        self.record_mut(disputant).open_disputes.insert(id);
    }

    /// Count a resolution in this user's favour
    ///
    /// `via_dispute` marks the disputant side. A claimant's win counts only
    /// toward the claim totals, even if the claim had been disputed.
    pub fn record_win(&mut self, address: &Address, id: ClaimId, via_dispute: bool) {
        let record = self.record_mut(address);
        if via_dispute {
            record.total_disputes += 1;
            record.won_disputes += 1;
            record.open_disputes.remove(&id);
            return;
        }

        record.total_claims += 1;
        record.correct_claims += 1;
        record.open_disputes.remove(&id);
        record.open_claims.remove(&id);
    }

    /// Count a resolution against this user
    ///
    /// `via_dispute` marks the disputant side.
    pub fn record_loss(&mut self, address: &Address, id: ClaimId, via_dispute: bool) {
        let record = self.record_mut(address);
        if via_dispute {
            record.total_disputes += 1;
            record.open_disputes.remove(&id);
            return;
        }

        record.total_claims += 1;
        if record.open_disputes.remove(&id) {
            record.total_disputes += 1;
        }
        record.open_claims.remove(&id);
    }

    /// Seal the batch into an owned write set
    pub fn finish(self) -> UsersWriteSet {
        UsersWriteSet {
            records: self.staged,
        }
    }

    fn record_mut(&mut self, address: &Address) -> &mut UserRecord {
        match self.staged.entry(address.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let record = self
                    .base
                    .get(address)
                    .cloned()
                    .unwrap_or_else(|| UserRecord::new(address.clone()));
                entry.insert(record)
            }
        }
    }
}

/// Sealed record changes ready to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsersWriteSet {
    records: BTreeMap<Address, UserRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(tracker: &mut UserStatsTracker, f: impl FnOnce(&mut UsersBatch<'_>)) {
        let mut batch = tracker.batch();
        f(&mut batch);
        let write_set = batch.finish();
        tracker.apply(write_set);
    }

    #[test]
    fn test_undisputed_win() {
        let alice = Address::new("0xA");
        let id = ClaimId::new(1);
        let mut tracker = UserStatsTracker::new();

        commit(&mut tracker, |b| b.open_claim(&alice, id));
        assert!(tracker.get(&alice).unwrap().open_claims.contains(&id));

        commit(&mut tracker, |b| b.record_win(&alice, id, false));
        let record = tracker.get(&alice).unwrap();
        assert_eq!(record.total_claims, 1);
        assert_eq!(record.correct_claims, 1);
        assert_eq!(record.total_disputes, 0);
        assert!(record.open_claims.is_empty());
    }

    #[test]
    fn test_dispute_timeout_counts_both_sides() {
        let alice = Address::new("0xA");
        let bob = Address::new("0xB");
        let id = ClaimId::new(1);
        let mut tracker = UserStatsTracker::new();

        commit(&mut tracker, |b| b.open_claim(&alice, id));
        commit(&mut tracker, |b| b.open_dispute(&alice, &bob, id));

        let claimant = tracker.get(&alice).unwrap();
        assert!(claimant.open_claims.is_empty());
        assert!(claimant.open_disputes.contains(&id));
        assert!(tracker.get(&bob).unwrap().open_disputes.contains(&id));

        commit(&mut tracker, |b| {
            b.record_loss(&alice, id, false);
            b.record_win(&bob, id, true);
        });

        let claimant = tracker.get(&alice).unwrap();
        assert_eq!(claimant.total_claims, 1);
        assert_eq!(claimant.correct_claims, 0);
        assert_eq!(claimant.total_disputes, 1);
        assert_eq!(claimant.won_disputes, 0);
        assert!(claimant.open_disputes.is_empty());

        let disputant = tracker.get(&bob).unwrap();
        assert_eq!(disputant.total_claims, 0);
        assert_eq!(disputant.total_disputes, 1);
        assert_eq!(disputant.won_disputes, 1);
        assert!(disputant.open_disputes.is_empty());
    }

    #[test]
    fn test_claimant_wins_disputed_claim() {
        let alice = Address::new("0xA");
        let bob = Address::new("0xB");
        let id = ClaimId::new(4);
        let mut tracker = UserStatsTracker::new();

        commit(&mut tracker, |b| {
            b.open_claim(&alice, id);
            b.open_dispute(&alice, &bob, id);
        });
        commit(&mut tracker, |b| {
            b.record_win(&alice, id, false);
            b.record_loss(&bob, id, true);
        });

        let claimant = tracker.get(&alice).unwrap();
        assert_eq!((claimant.total_claims, claimant.correct_claims), (1, 1));
        assert_eq!((claimant.total_disputes, claimant.won_disputes), (0, 0));
        assert!(claimant.open_disputes.is_empty());

        let disputant = tracker.get(&bob).unwrap();
        assert_eq!((disputant.total_disputes, disputant.won_disputes), (1, 0));
    }

    #[test]
    fn test_dropped_batch_discards_changes() {
        let alice = Address::new("0xA");
        let mut tracker = UserStatsTracker::new();
        {
            let mut batch = tracker.batch();
            batch.ensure_user(&alice);
            assert!(batch.get(&alice).is_some());
        }
        assert!(tracker.is_empty());

        commit(&mut tracker, |b| b.ensure_user(&alice));
        assert_eq!(tracker.get(&alice), Some(&UserRecord::new(alice.clone())));
    }
}
