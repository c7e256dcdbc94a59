//! Account balances with batch-atomic writes
//!
//! Every mutation goes through a [`LedgerBatch`]: the batch reads through to
//! the committed balances, stages its effects in an overlay, and is turned
//! into an owned [`WriteSet`] that [`Ledger::apply`] installs in one step.
//! Dropping a batch discards it, so a failure half-way through a multi-step
//! operation never leaves a partial effect behind.
//!
//! # Example
//!
//! ```
//! use escrow_ledger::{Address, Ledger};
//!
//! let mut ledger = Ledger::new();
//! let alice = Address::new("0xA1");
//! let pool = Address::new("0x01");
//!
//! ledger.deposit(&alice, 10).unwrap();
//!
//! let mut batch = ledger.batch();
//! batch.transfer(&alice, &pool, 4).unwrap();
//! let write_set = batch.finish();
//! ledger.apply(write_set);
//!
//! assert_eq!(ledger.balance(&alice), 6);
//! assert_eq!(ledger.balance(&pool), 4);
//! ```

use crate::{
    types::{Address, Amount},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Committed ledger state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Balance per account
    accounts: BTreeMap<Address, Amount>,

    /// Sum of all balances, moved only by deposit and withdraw
    total_supply: Amount,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an account.
    ///
    /// Accounts are materialized lazily: an address that was never credited
    /// reads as a zero balance. Never fails.
    pub fn balance(&self, address: &Address) -> Amount {
        self.accounts.get(address).copied().unwrap_or(0)
    }

    /// Total funds held across all accounts
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// All materialized accounts in address order
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, Amount)> + '_ {
        self.accounts.iter().map(|(address, balance)| (address, *balance))
    }

    /// Credit `amount` to `address`
    pub fn deposit(&mut self, address: &Address, amount: Amount) -> Result<()> {
        let mut batch = self.batch();
        batch.deposit(address, amount)?;
        let write_set = batch.finish();
        self.apply(write_set);
        Ok(())
    }

    /// Debit `amount` from `address`
    pub fn withdraw(&mut self, address: &Address, amount: Amount) -> Result<()> {
        let mut batch = self.batch();
        batch.withdraw(address, amount)?;
        let write_set = batch.finish();
        self.apply(write_set);
        Ok(())
    }

    /// Move `amount` from `from` to `to`; both sides apply or neither does
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        let mut batch = self.batch();
        batch.transfer(from, to, amount)?;
        let write_set = batch.finish();
        self.apply(write_set);
        Ok(())
    }

    /// Open a staged batch over the committed balances
    pub fn batch(&self) -> LedgerBatch<'_> {
        LedgerBatch {
            base: self,
            staged: BTreeMap::new(),
            total_supply: self.total_supply,
        }
    }

    /// Install a finished batch
    ///
    /// Every supply change touches a balance, so an empty write set is a no-op.
    pub fn apply(&mut self, write_set: WriteSet) {
        if write_set.is_empty() {
            return;
        }

        let touched = write_set.len();
        for (address, balance) in write_set.balances {
            self.accounts.insert(address, balance);
        }
        self.total_supply = write_set.total_supply;

        tracing::debug!("Applied ledger write set touching {} accounts", touched);
    }

    /// Check money conservation: Σ(balances) == total supply
    pub fn check_conservation(&self) -> Result<()> {
        let mut sum: Amount = 0;
        for balance in self.accounts.values() {
            sum = sum.checked_add(*balance).ok_or_else(|| {
                Error::InvariantViolation("balance sum overflows".to_string())
            })?;
        }

        if sum != self.total_supply {
            return Err(Error::InvariantViolation(format!(
                "sum of balances {} differs from total supply {}",
                sum, self.total_supply
            )));
        }

        Ok(())
    }
}

/// Staged set of balance changes over a committed [`Ledger`]
#[derive(Debug)]
pub struct LedgerBatch<'a> {
    base: &'a Ledger,
    staged: BTreeMap<Address, Amount>,
    total_supply: Amount,
}

impl<'a> LedgerBatch<'a> {
    /// Balance as seen through this batch
    pub fn balance(&self, address: &Address) -> Amount {
        match self.staged.get(address) {
            Some(balance) => *balance,
            None => self.base.balance(address),
        }
    }

    /// Total supply as seen through this batch
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Stage a credit
    pub fn deposit(&mut self, address: &Address, amount: Amount) -> Result<()> {
        ensure_positive(amount, "deposit")?;

        let balance = self
            .balance(address)
            .checked_add(amount)
            .ok_or_else(|| overflow("balance", address))?;
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| overflow("total supply", address))?;

        self.staged.insert(address.clone(), balance);
        self.total_supply = total_supply;
        Ok(())
    }

    /// Stage a debit
    pub fn withdraw(&mut self, address: &Address, amount: Amount) -> Result<()> {
        ensure_positive(amount, "withdraw")?;
        let available = self.ensure_available(address, amount)?;

        self.staged.insert(address.clone(), available - amount);
        // Supply covers every balance, so it covers this debit too.
        self.total_supply -= amount;
        Ok(())
    }

    /// Stage a transfer between two accounts
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        ensure_positive(amount, "transfer")?;
        let available = self.ensure_available(from, amount)?;

        if from == to {
            return Ok(());
        }

        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| overflow("balance", to))?;

        self.staged.insert(from.clone(), available - amount);
        self.staged.insert(to.clone(), credited);
        Ok(())
    }

    /// Seal the batch into an owned write set
    pub fn finish(self) -> WriteSet {
        WriteSet {
            balances: self.staged,
            total_supply: self.total_supply,
        }
    }

    fn ensure_available(&self, address: &Address, amount: Amount) -> Result<Amount> {
        let available = self.balance(address);
        if available < amount {
            return Err(Error::InsufficientFunds {
                address: address.clone(),
                required: amount,
                available,
            });
        }
        Ok(available)
    }
}

/// Sealed balance changes ready to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    balances: BTreeMap<Address, Amount>,
    total_supply: Amount,
}

impl WriteSet {
    /// Number of accounts touched
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// True if no account is touched
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

fn ensure_positive(amount: Amount, operation: &str) -> Result<()> {
    if amount == 0 {
        return Err(Error::InvalidAmount(format!(
            "{} amount must be positive",
            operation
        )));
    }
    Ok(())
}

fn overflow(what: &str, address: &Address) -> Error {
    Error::InvariantViolation(format!("{} overflow crediting {}", what, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    #[test]
    fn test_deposit_then_withdraw_to_zero() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");

        ledger.deposit(&a, 10).unwrap();
        ledger.withdraw(&a, 10).unwrap();
        assert_eq!(ledger.balance(&a), 0);

        let err = ledger.withdraw(&a, 1).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { required: 1, available: 0, .. }));
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        let b = addr("0xB");

        assert!(matches!(ledger.deposit(&a, 0), Err(Error::InvalidAmount(_))));
        assert!(matches!(ledger.withdraw(&a, 0), Err(Error::InvalidAmount(_))));
        assert!(matches!(ledger.transfer(&a, &b, 0), Err(Error::InvalidAmount(_))));
        assert_eq!(ledger, Ledger::new());
    }

    #[test]
    fn test_unknown_account_reads_zero() {
        let ledger = Ledger::new();
        assert_eq!(ledger.balance(&addr("0xnobody")), 0);
        assert_eq!(ledger.accounts().count(), 0);
    }

    #[test]
    fn test_mixed_case_addresses_share_balance() {
        let mut ledger = Ledger::new();
        ledger.deposit(&addr("0xABCD"), 5).unwrap();
        assert_eq!(ledger.balance(&addr("0xabcd")), 5);
    }

    #[test]
    fn test_transfer_preserves_supply() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        let b = addr("0xB");

        ledger.deposit(&a, 100).unwrap();
        ledger.transfer(&a, &b, 30).unwrap();

        assert_eq!(ledger.balance(&a), 70);
        assert_eq!(ledger.balance(&b), 30);
        assert_eq!(ledger.total_supply(), 100);
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn test_failed_transfer_changes_nothing() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        let b = addr("0xB");
        ledger.deposit(&a, 5).unwrap();
        let before = ledger.clone();

        let err = ledger.transfer(&a, &b, 6).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_self_transfer_is_checked_noop() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        ledger.deposit(&a, 5).unwrap();

        ledger.transfer(&a, &a, 5).unwrap();
        assert_eq!(ledger.balance(&a), 5);
        assert!(ledger.transfer(&a, &a, 6).is_err());
    }

    #[test]
    fn test_dropped_batch_is_discarded() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        let pool = addr("0x01");
        ledger.deposit(&a, 10).unwrap();
        let before = ledger.clone();

        {
            let mut batch = ledger.batch();
            batch.transfer(&a, &pool, 4).unwrap();
            batch.deposit(&pool, 1).unwrap();
            assert_eq!(batch.balance(&pool), 5);
            assert_eq!(batch.total_supply(), 11);
            // Second step fails; the batch is dropped without apply.
            assert!(batch.withdraw(&a, 7).is_err());
        }

        assert_eq!(ledger, before);
    }

    #[test]
    fn test_apply_empty_write_set_is_noop() {
        let mut ledger = Ledger::new();
        ledger.deposit(&addr("0xA"), 10).unwrap();
        let before = ledger.clone();

        let write_set = ledger.batch().finish();
        assert!(write_set.is_empty());
        ledger.apply(write_set);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_batch_reads_its_own_writes() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        let b = addr("0xB");
        ledger.deposit(&a, 10).unwrap();

        let mut batch = ledger.batch();
        batch.transfer(&a, &b, 10).unwrap();
        // a is drained inside the batch even though the ledger still shows 10
        assert!(batch.transfer(&a, &b, 1).is_err());
        batch.transfer(&b, &a, 3).unwrap();
        let write_set = batch.finish();
        assert_eq!(write_set.len(), 2);

        ledger.apply(write_set);
        assert_eq!(ledger.balance(&a), 3);
        assert_eq!(ledger.balance(&b), 7);
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn test_deposit_overflow_is_invariant_violation() {
        let mut ledger = Ledger::new();
        let a = addr("0xA");
        ledger.deposit(&a, Amount::MAX).unwrap();

        let err = ledger.deposit(&addr("0xB"), 1).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(ledger.total_supply(), Amount::MAX);
    }
}
