//! Arbitration engine
//!
//! Owns the ledger, the claim registry and the user table. Each trigger runs
//! its precondition chain against a transaction staged over the committed
//! state; the combined write set is applied only if every step succeeds.

use crate::{
    config::Config,
    metrics::Metrics,
    proof::ProofVerifier,
    registry::{ClaimRegistry, RegistryBatch, RegistryWriteSet},
    trigger::{
        Action, DepositPayload, DisputePayload, FinalizePayload, OpenClaimPayload, Outcome,
        Receipt, Trigger, ValidatePayload, WithdrawPayload,
    },
    types::{Claim, ClaimAction, ClaimId, ClaimStatus, ExternalTransfer, Timestamp, UserRecord},
    users::{UserStatsTracker, UsersBatch, UsersWriteSet},
    Error, Result,
};
use escrow_ledger::{Address, Amount, Ledger, LedgerBatch, WriteSet};
use serde::Serialize;

/// Snapshot of all committed state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineState {
    /// Account balances
    pub ledger: Ledger,

    /// Claims and the live preparation CID index
    pub claims: ClaimRegistry,

    /// Participation statistics
    pub users: UserStatsTracker,
}

impl EngineState {
    fn apply(&mut self, changes: Changes) {
        self.ledger.apply(changes.ledger);
        self.claims.apply(changes.claims);
        self.users.apply(changes.users);
    }
}

/// Staged view over [`EngineState`] for one trigger
struct Transaction<'a> {
    ledger: LedgerBatch<'a>,
    claims: RegistryBatch<'a>,
    users: UsersBatch<'a>,
}

impl<'a> Transaction<'a> {
    fn new(state: &'a EngineState) -> Self {
        Self {
            ledger: state.ledger.batch(),
            claims: state.claims.batch(),
            users: state.users.batch(),
        }
    }

    fn finish(self) -> Changes {
        Changes {
            ledger: self.ledger.finish(),
            claims: self.claims.finish(),
            users: self.users.finish(),
        }
    }
}

struct Changes {
    ledger: WriteSet,
    claims: RegistryWriteSet,
    users: UsersWriteSet,
}

/// Claims arbitration engine
#[derive(Debug)]
pub struct ArbitrationEngine {
    /// Configuration
    config: Config,

    /// Proof recomputation
    verifier: ProofVerifier,

    /// Committed state
    state: EngineState,

    /// Prometheus collectors
    metrics: Metrics,
}

impl ArbitrationEngine {
    /// Create an engine with empty state
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let verifier = ProofVerifier::new(config.proof.clone());
        let metrics = Metrics::new()?;

        tracing::info!(
            "Arbitration engine {} v{} ready (pool {}, treasury {})",
            config.service_name,
            config.service_version,
            config.addresses.locked_pool,
            config.addresses.treasury
        );

        Ok(Self {
            config,
            verifier,
            state: EngineState::default(),
            metrics,
        })
    }

    /// Rebuild an engine by handling `triggers` in order
    ///
    /// Rejected triggers are skipped, as they were when first handled.
    pub fn replay(config: Config, triggers: impl IntoIterator<Item = Trigger>) -> Result<Self> {
        let mut engine = Self::new(config)?;
        let mut rejected = 0usize;
        for trigger in triggers {
            if engine.handle(&trigger).is_err() {
                rejected += 1;
            }
        }
        tracing::info!(
            "Replay complete: {} claims, {} rejected triggers",
            engine.state.claims.len(),
            rejected
        );
        Ok(engine)
    }

    /// Handle one trigger atomically
    pub fn handle(&mut self, trigger: &Trigger) -> Result<Receipt> {
        let kind = trigger.action.kind();
        tracing::debug!("Handling {} from {} at {}", kind, trigger.sender, trigger.timestamp);

        let result = {
            let mut tx = Transaction::new(&self.state);
            self.execute(&mut tx, trigger)
                .map(|receipt| (receipt, tx.finish()))
        };

        match result {
            Ok((receipt, changes)) => {
                self.state.apply(changes);
                self.metrics.record_trigger(kind, true);
                if let Some(claim) = receipt.claim.as_ref().filter(|c| !c.is_live()) {
                    self.metrics.record_resolution(claim.status.as_str());
                }
                self.metrics.set_live_claims(self.state.claims.live_count());

                tracing::info!("{} from {} accepted: {}", kind, trigger.sender, receipt.message);
                Ok(receipt)
            }
            Err(err) => {
                self.metrics.record_trigger(kind, false);
                self.metrics.record_rejection(kind, err.kind());
                tracing::warn!(
                    reason = err.kind(),
                    "{} from {} rejected: {}",
                    kind,
                    trigger.sender,
                    err
                );
                Err(err)
            }
        }
    }

    /// Handle one trigger and wrap the result for the host
    pub fn process(&mut self, trigger: &Trigger) -> Outcome {
        self.handle(trigger).into()
    }

    /// Balance of an account
    pub fn balance(&self, address: &Address) -> Amount {
        self.state.ledger.balance(address)
    }

    /// Claim by id
    pub fn claim(&self, id: ClaimId) -> Option<&Claim> {
        self.state.claims.get(id)
    }

    /// User record by address
    pub fn user(&self, address: &Address) -> Option<&UserRecord> {
        self.state.users.get(address)
    }

    /// Committed state
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Proof verifier configured for this engine
    pub fn verifier(&self) -> &ProofVerifier {
        &self.verifier
    }

    /// Prometheus collectors
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Check conservation, pool coverage and the live CID index
    pub fn check_invariants(&self) -> Result<()> {
        self.state.ledger.check_conservation()?;
        self.state.claims.check_index()?;

        let locked = self.locked_in_pool()?;
        let pool = self.state.ledger.balance(&self.config.addresses.locked_pool);
        if pool < locked {
            return Err(Error::InvariantViolation(format!(
                "locked pool holds {} but live claims lock {}",
                pool, locked
            )));
        }

        Ok(())
    }

    /// Collateral and stakes held for live claims
    fn locked_in_pool(&self) -> Result<Amount> {
        self.state
            .claims
            .iter()
            .filter(|c| c.is_live())
            .try_fold(0, |locked, claim| add(locked, self.lock_of(claim)))
    }

    fn lock_of(&self, claim: &Claim) -> Amount {
        match claim.disputant {
            Some(_) => claim
                .collateral
                .saturating_add(self.config.protocol.validator_staking),
            None => claim.collateral,
        }
    }

    /// Release a resolved claim's lock and pay out of the pool
    ///
    /// Payouts beyond the released lock come from the pool's free balance;
    /// funds locked by other live claims are never touched.
    fn settle(
        &self,
        tx: &mut Transaction<'_>,
        claim: &Claim,
        payouts: &[(&Address, Amount)],
    ) -> Result<()> {
        let pool = &self.config.addresses.locked_pool;
        let required = payouts
            .iter()
            .try_fold(0, |total, (_, amount)| add(total, *amount))?;

        let held_for_others = self
            .locked_in_pool()?
            .saturating_sub(self.lock_of(claim));
        let available = tx.ledger.balance(pool).saturating_sub(held_for_others);
        if required > available {
            return Err(Error::InsufficientFunds {
                address: pool.clone(),
                required,
                available,
            });
        }

        for (destination, amount) in payouts {
            tx.ledger.transfer(pool, destination, *amount)?;
        }
        Ok(())
    }

    fn execute(&self, tx: &mut Transaction<'_>, trigger: &Trigger) -> Result<Receipt> {
        let sender = &trigger.sender;
        let now = trigger.timestamp;

        if sender == &self.config.addresses.locked_pool {
            return Err(Error::Unauthorized(format!(
                "{} is the escrow pool and cannot act",
                sender
            )));
        }

        match &trigger.action {
            Action::Deposit(payload) => self.deposit(tx, sender, payload),
            Action::Withdraw(payload) => self.withdraw(tx, sender, payload),
            Action::OpenClaim(payload) => self.open_claim(tx, sender, payload, now),
            Action::Dispute(payload) => self.dispute(tx, sender, payload, now),
            Action::Finalize(payload) => self.finalize(tx, payload, now),
            Action::Validate(payload) => self.validate(tx, sender, payload, now),
        }
    }

    fn deposit(
        &self,
        tx: &mut Transaction<'_>,
        sender: &Address,
        payload: &DepositPayload,
    ) -> Result<Receipt> {
        let addresses = &self.config.addresses;
        if sender != &addresses.portal {
            return Err(Error::Unauthorized(format!(
                "{} is not the deposit portal",
                sender
            )));
        }
        if payload.amount == 0 {
            return Err(Error::InvalidAmount("deposit amount must be positive".to_string()));
        }

        if payload.token != addresses.accepted_token {
            return Ok(Receipt::notice(format!(
                "Token {} not accepted, refunding {} to {}",
                payload.token, payload.amount, payload.depositor
            ))
            .with_transfer(ExternalTransfer {
                destination: payload.depositor.clone(),
                token: payload.token.clone(),
                amount: payload.amount,
            }));
        }

        tx.ledger.deposit(&payload.depositor, payload.amount)?;
        tx.users.ensure_user(&payload.depositor);

        Ok(Receipt::notice(format!(
            "Deposited {} to {}",
            payload.amount, payload.depositor
        )))
    }

    fn withdraw(
        &self,
        tx: &mut Transaction<'_>,
        sender: &Address,
        payload: &WithdrawPayload,
    ) -> Result<Receipt> {
        tx.ledger.withdraw(sender, payload.amount)?;

        Ok(
            Receipt::notice(format!("Withdrew {} for {}", payload.amount, sender)).with_transfer(
                ExternalTransfer {
                    destination: sender.clone(),
                    token: self.config.addresses.accepted_token.clone(),
                    amount: payload.amount,
                },
            ),
        )
    }

    fn open_claim(
        &self,
        tx: &mut Transaction<'_>,
        claimant: &Address,
        payload: &OpenClaimPayload,
        now: Timestamp,
    ) -> Result<Receipt> {
        let required = self.config.protocol.collateral_amount;
        if payload.collateral != required {
            return Err(Error::InvalidAmount(format!(
                "collateral must be exactly {}, got {}",
                required, payload.collateral
            )));
        }
        if payload.preparation_cid.is_empty() || payload.computation_proof.is_empty() {
            return Err(Error::InvalidPayload(
                "preparationCID and computationProof are required".to_string(),
            ));
        }
        if tx.claims.lookup_by_preparation_cid(&payload.preparation_cid).is_some() {
            return Err(Error::DuplicateClaim(payload.preparation_cid.clone()));
        }

        tracing::debug!("Locking collateral {} from {}", required, claimant);
        tx.ledger
            .transfer(claimant, &self.config.addresses.locked_pool, required)?;

        let claim = tx.claims.create(
            claimant,
            &payload.preparation_cid,
            &payload.computation_cid,
            &payload.computation_proof,
            required,
            now,
        )?;
        tx.users.open_claim(claimant, claim.id);

        Ok(Receipt::notice(format!("Claim {} opened", claim.id)).with_claim(claim))
    }

    fn dispute(
        &self,
        tx: &mut Transaction<'_>,
        disputant: &Address,
        payload: &DisputePayload,
        now: Timestamp,
    ) -> Result<Receipt> {
        let required = self.config.protocol.validator_staking;
        let available = tx.ledger.balance(disputant);
        if available < required {
            return Err(Error::InsufficientFunds {
                address: disputant.clone(),
                required,
                available,
            });
        }
        if payload.staking_amount != required {
            return Err(Error::InvalidAmount(format!(
                "stake must be exactly {}, got {}",
                required, payload.staking_amount
            )));
        }

        let id = payload.claim_id;
        let claim = tx.claims.get(id).ok_or(Error::ClaimNotFound(id))?;
        check_preparation(claim, &payload.preparation_cid)?;
        let claimant = claim.claimant.clone();

        tracing::debug!("Claim {} eligible for dispute by {}", id, disputant);
        let claim = tx.claims.initiate_dispute(id, disputant, now)?;
        tx.ledger
            .transfer(disputant, &self.config.addresses.locked_pool, required)?;
        tx.users.open_dispute(&claimant, disputant, id);

        Ok(Receipt::notice(format!("Claim {} disputed by {}", id, disputant)).with_claim(claim))
    }

    fn finalize(
        &self,
        tx: &mut Transaction<'_>,
        payload: &FinalizePayload,
        now: Timestamp,
    ) -> Result<Receipt> {
        let id = payload.claim_id;
        let claim = tx.claims.get(id).ok_or(Error::ClaimNotFound(id))?;
        if let Some(cid) = &payload.preparation_cid {
            check_preparation(claim, cid)?;
        }

        let protocol = &self.config.protocol;
        let claim = tx.claims.finalize_by_timeout(
            id,
            now,
            protocol.claim_epoch_secs,
            protocol.dispute_epoch_secs,
        )?;

        match claim.status {
            ClaimStatus::Finalized => {
                let payout = add(claim.collateral, protocol.claim_incentive)?;
                self.settle(tx, &claim, &[(&claim.claimant, payout)])?;
                tx.users.record_win(&claim.claimant, id, false);
            }
            ClaimStatus::Disputed => {
                let disputant = disputant_of(&claim)?;
                self.settle(tx, &claim, &[(&disputant, claim.collateral)])?;
                tx.users.record_loss(&claim.claimant, id, false);
                tx.users.record_win(&disputant, id, true);
            }
            status => {
                return Err(Error::InvariantViolation(format!(
                    "timeout left claim {} in {}",
                    id, status
                )))
            }
        }

        Ok(Receipt::notice(format!("Claim {} {}", id, claim.status)).with_claim(claim))
    }

    fn validate(
        &self,
        tx: &mut Transaction<'_>,
        requester: &Address,
        payload: &ValidatePayload,
        now: Timestamp,
    ) -> Result<Receipt> {
        let id = payload.claim_id;
        let claim = tx.claims.get(id).ok_or(Error::ClaimNotFound(id))?;
        if requester != &claim.claimant {
            return Err(Error::Unauthorized(format!(
                "only the claimant can validate claim {}",
                id
            )));
        }
        if claim.status.next(ClaimAction::ProveValid).is_none() {
            return Err(Error::InvalidTransition {
                claim_id: id,
                status: claim.status,
                action: ClaimAction::ProveValid,
            });
        }
        if payload.computation_proof != claim.proof_hash {
            return Err(Error::InvalidPayload(format!(
                "computationProof does not restate the commitment of claim {}",
                id
            )));
        }

        let matched = self
            .verifier
            .verify(&payload.preprocessed_data, &claim.proof_hash)?;
        let claim = tx.claims.resolve_by_proof(id, matched, now)?;

        let protocol = &self.config.protocol;
        let disputant = claim.disputant.clone();

        match (matched, disputant) {
            (true, None) => {
                let payout = add(claim.collateral, protocol.claim_incentive)?;
                self.settle(tx, &claim, &[(&claim.claimant, payout)])?;
                tx.users.record_win(&claim.claimant, id, false);
            }
            (true, Some(disputant)) => {
                let payout = add(
                    add(claim.collateral, protocol.validator_staking)?,
                    protocol.claim_incentive,
                )?;
                self.settle(tx, &claim, &[(&claim.claimant, payout)])?;
                tx.users.record_win(&claim.claimant, id, false);
                tx.users.record_loss(&disputant, id, true);
            }
            (false, Some(disputant)) => {
                let payout = add(
                    add(claim.collateral, protocol.validator_staking)?,
                    protocol.claim_incentive,
                )?;
                self.settle(tx, &claim, &[(&disputant, payout)])?;
                tx.users.record_win(&disputant, id, true);
                tx.users.record_loss(&claim.claimant, id, false);
            }
            (false, None) => {
                tracing::debug!("Forfeiting collateral of claim {} to treasury", id);
                let treasury = &self.config.addresses.treasury;
                self.settle(tx, &claim, &[(treasury, claim.collateral)])?;
                tx.users.record_loss(&claim.claimant, id, false);
            }
        }

        Ok(Receipt::notice(format!("Claim {} {}", id, claim.status)).with_claim(claim))
    }
}

fn check_preparation(claim: &Claim, cid: &str) -> Result<()> {
    if claim.preparation_cid != cid {
        return Err(Error::PreparationMismatch {
            claim_id: claim.id,
            expected: cid.to_string(),
            found: claim.preparation_cid.clone(),
        });
    }
    Ok(())
}

fn disputant_of(claim: &Claim) -> Result<Address> {
    claim.disputant.clone().ok_or_else(|| {
        Error::InvariantViolation(format!("claim {} has no disputant", claim.id))
    })
}

fn add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b)
        .ok_or_else(|| Error::InvariantViolation(format!("payout overflow: {} + {}", a, b)))
}
