//! Inbound triggers and outbound outcomes
//!
//! A trigger is one JSON object: the sender, the trigger timestamp, the
//! action kind and a kind-specific payload, e.g.
//!
//! ```json
//! {"senderAddress":"0xabc","timestamp":0,"actionKind":"Withdraw","payload":{"amount":5}}
//! ```
//!
//! The payload is held as raw JSON until the kind is known, so amounts keep
//! their full `u128` range whichever order the fields arrive in.

use crate::{
    types::{Claim, ClaimId, ExternalTransfer, Timestamp},
    Error, Result,
};
use escrow_ledger::{Address, Amount};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Input delivered by the host environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WireTrigger")]
pub struct Trigger {
    /// Authenticated sender address
    pub sender: Address,

    /// Trigger time in seconds
    pub timestamp: Timestamp,

    /// Requested action
    pub action: Action,
}

impl Trigger {
    /// Create a trigger
    pub fn new(sender: impl Into<Address>, timestamp: Timestamp, action: Action) -> Self {
        Self {
            sender: sender.into(),
            timestamp,
            action,
        }
    }

    /// Parse one JSON trigger
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::InvalidPayload(format!("Malformed trigger: {}", e)))
    }

    /// Encode as one JSON trigger
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidPayload(format!("Unencodable trigger: {}", e)))
    }
}

impl Serialize for Trigger {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        WireTriggerRef {
            sender_address: &self.sender,
            timestamp: self.timestamp,
            action: &self.action,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrigger {
    sender_address: Address,
    timestamp: Timestamp,
    action_kind: ActionKind,
    payload: Box<RawValue>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTriggerRef<'a> {
    sender_address: &'a Address,
    timestamp: Timestamp,
    #[serde(flatten)]
    action: &'a Action,
}

impl TryFrom<WireTrigger> for Trigger {
    type Error = Error;

    fn try_from(wire: WireTrigger) -> Result<Self> {
        let action = Action::decode(wire.action_kind, wire.payload.get())?;
        Ok(Trigger::new(wire.sender_address, wire.timestamp, action))
    }
}

/// Wire name of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ActionKind {
    /// Portal deposit report
    Deposit,
    /// Balance payout
    Withdraw,
    /// New claim
    OpenClaim,
    /// Stake against a claim
    Dispute,
    /// Timeout finalization
    Finalize,
    /// Proof submission
    Validate,
}

/// Action carried by a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "actionKind", content = "payload")]
pub enum Action {
    /// Portal reports funds entering the escrow domain
    Deposit(DepositPayload),
    /// Sender pays out part of their balance
    Withdraw(WithdrawPayload),
    /// Sender opens a claim and locks collateral
    OpenClaim(OpenClaimPayload),
    /// Sender stakes against an open claim
    Dispute(DisputePayload),
    /// Anyone finalizes a claim whose epoch has elapsed
    Finalize(FinalizePayload),
    /// Claimant submits telemetry for proof recomputation
    Validate(ValidatePayload),
}

impl Action {
    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Deposit(_) => "deposit",
            Action::Withdraw(_) => "withdraw",
            Action::OpenClaim(_) => "open_claim",
            Action::Dispute(_) => "dispute",
            Action::Finalize(_) => "finalize",
            Action::Validate(_) => "validate",
        }
    }

    /// Decode a raw payload for the given kind
    pub fn decode(kind: ActionKind, payload: &str) -> Result<Self> {
        let action = match kind {
            ActionKind::Deposit => serde_json::from_str(payload).map(Action::Deposit),
            ActionKind::Withdraw => serde_json::from_str(payload).map(Action::Withdraw),
            ActionKind::OpenClaim => serde_json::from_str(payload).map(Action::OpenClaim),
            ActionKind::Dispute => serde_json::from_str(payload).map(Action::Dispute),
            ActionKind::Finalize => serde_json::from_str(payload).map(Action::Finalize),
            ActionKind::Validate => serde_json::from_str(payload).map(Action::Validate),
        };
        action.map_err(|e| Error::InvalidPayload(format!("Bad {:?} payload: {}", kind, e)))
    }
}

/// Deposit reported by the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositPayload {
    /// Account to credit
    pub depositor: Address,
    /// Token contract the funds arrived in
    pub token: Address,
    /// Amount deposited
    pub amount: Amount,
}

/// Withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawPayload {
    /// Amount to pay out
    pub amount: Amount,
}

/// New claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenClaimPayload {
    /// Input data identifier
    #[serde(rename = "preparationCID")]
    pub preparation_cid: String,
    /// Output data identifier
    #[serde(rename = "computationCID")]
    pub computation_cid: String,
    /// Collateral offered
    pub collateral: Amount,
    /// Committed digest of the canonical aggregate
    pub computation_proof: String,
}

/// Stake against an open claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputePayload {
    /// Disputed claim
    pub claim_id: ClaimId,
    /// Stake offered
    pub staking_amount: Amount,
    /// Must match the claim's input identifier
    #[serde(rename = "preparationCID")]
    pub preparation_cid: String,
}

/// Timeout finalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizePayload {
    /// Claim to finalize
    pub claim_id: ClaimId,
    /// Checked against the claim when present
    #[serde(rename = "preparationCID", default, skip_serializing_if = "Option::is_none")]
    pub preparation_cid: Option<String>,
}

/// Proof submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePayload {
    /// Claim being proven
    pub claim_id: ClaimId,
    /// Raw CSV telemetry
    pub preprocessed_data: String,
    /// Must restate the digest committed when the claim was opened
    pub computation_proof: String,
}

/// Result of an accepted trigger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    /// Human-readable notice
    pub message: String,

    /// Claim touched by the trigger, after the change
    pub claim: Option<Claim>,

    /// Payouts the boundary layer must execute
    pub transfers: Vec<ExternalTransfer>,
}

impl Receipt {
    /// Receipt with only a message
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach the touched claim
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claim = Some(claim);
        self
    }

    /// Attach a payout instruction
    pub fn with_transfer(mut self, transfer: ExternalTransfer) -> Self {
        self.transfers.push(transfer);
        self
    }
}

/// Outcome reported back to the host for every trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// State changed; instructions must be executed
    Accepted {
        /// Human-readable notice
        message: String,
        /// Claim touched by the trigger
        #[serde(rename = "claimSnapshot")]
        claim: Option<Claim>,
        /// Payout instructions
        transfers: Vec<ExternalTransfer>,
    },
    /// Nothing changed
    #[serde(rename_all = "camelCase")]
    Rejected {
        /// Rejection reason
        error_message: String,
    },
}

impl Outcome {
    /// True for accepted triggers
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }
}

impl From<Result<Receipt>> for Outcome {
    fn from(result: Result<Receipt>) -> Self {
        match result {
            Ok(receipt) => Outcome::Accepted {
                message: receipt.message,
                claim: receipt.claim,
                transfers: receipt.transfers,
            },
            Err(err) => Outcome::Rejected {
                error_message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_claim() {
        let trigger = Trigger::from_json(
            r#"{"senderAddress":"0xABC","timestamp":7,"actionKind":"OpenClaim","payload":{
                "preparationCID":"prep","computationCID":"comp",
                "collateral":1000000000000000000,"computationProof":"aa"}}"#,
        )
        .unwrap();

        assert_eq!(trigger.sender.as_str(), "0xabc");
        assert_eq!(trigger.timestamp, 7);
        assert_eq!(trigger.action.kind(), "open_claim");
        match trigger.action {
            Action::OpenClaim(payload) => {
                assert_eq!(payload.preparation_cid, "prep");
                assert_eq!(payload.collateral, 1_000_000_000_000_000_000);
                assert_eq!(payload.computation_proof, "aa");
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_payload_before_kind_keeps_wide_amounts() {
        let trigger = Trigger::from_json(
            r#"{"payload":{"depositor":"0xD","token":"0xT","amount":340282366920938463463374607431768211455},
                "actionKind":"Deposit","timestamp":1,"senderAddress":"0xP"}"#,
        )
        .unwrap();

        match trigger.action {
            Action::Deposit(payload) => assert_eq!(payload.amount, u128::MAX),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_wire_shape_survives_encoding() {
        let trigger = Trigger::new(
            "0xA",
            9,
            Action::Dispute(DisputePayload {
                claim_id: ClaimId::new(2),
                staking_amount: 10u128.pow(24),
                preparation_cid: "prep".to_string(),
            }),
        );

        let json = trigger.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["senderAddress"], "0xa");
        assert_eq!(value["actionKind"], "Dispute");
        assert_eq!(value["payload"]["claimId"], 2);
        assert_eq!(value["payload"]["preparationCID"], "prep");
        assert_eq!(Trigger::from_json(&json).unwrap(), trigger);
    }

    #[test]
    fn test_finalize_cid_is_optional() {
        let trigger = Trigger::from_json(
            r#"{"senderAddress":"0x1","timestamp":0,"actionKind":"Finalize","payload":{"claimId":3}}"#,
        )
        .unwrap();
        assert_eq!(
            trigger.action,
            Action::Finalize(FinalizePayload {
                claim_id: ClaimId::new(3),
                preparation_cid: None,
            })
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Trigger::from_json(
            r#"{"senderAddress":"0x1","timestamp":0,"actionKind":"Mint","payload":{}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }

    #[test]
    fn test_payload_mismatching_kind_rejected() {
        let err = Trigger::from_json(
            r#"{"senderAddress":"0x1","timestamp":0,"actionKind":"Dispute","payload":{"amount":1}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(msg) if msg.contains("Dispute")));
    }

    #[test]
    fn test_outcome_json_shape() {
        let transfer = ExternalTransfer {
            destination: Address::new("0xD"),
            token: Address::new("0xT"),
            amount: 3,
        };
        let accepted = Outcome::from(Ok(Receipt::notice("ok").with_transfer(transfer)));
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["message"], "ok");
        assert!(json["claimSnapshot"].is_null());
        assert_eq!(
            json["transfers"],
            serde_json::json!([{"destinationAddress":"0xd","tokenReference":"0xt","amount":3}])
        );

        let rejected = Outcome::from(Err(Error::SelfDispute(ClaimId::new(1))));
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["errorMessage"], "Cannot dispute own claim 1");
    }
}
