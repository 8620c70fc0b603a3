use crate::error::{PilotError, Result};
use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub type ChainId = u64;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Transfer,
    Swap,
    Bridge,
    Open,
    Close,
    Borrow,
    Repay,
    Leverage,
    Deleverage,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::Transfer,
            ActionKind::Swap,
            ActionKind::Bridge,
            ActionKind::Open,
            ActionKind::Close,
            ActionKind::Borrow,
            ActionKind::Repay,
            ActionKind::Leverage,
            ActionKind::Deleverage,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Transfer => "TRANSFER",
            ActionKind::Swap => "SWAP",
            ActionKind::Bridge => "BRIDGE",
            ActionKind::Open => "OPEN",
            ActionKind::Close => "CLOSE",
            ActionKind::Borrow => "BORROW",
            ActionKind::Repay => "REPAY",
            ActionKind::Leverage => "LEVERAGE",
            ActionKind::Deleverage => "DELEVERAGE",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = PilotError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PilotError::UnknownActionKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ArgKind / ActionArg
// ---------------------------------------------------------------------------

/// Display hint for an action argument shown to the user before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    Chain,
    Protocol,
    Action,
    Token,
    Amount,
    Address,
    Number,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionArg {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArgKind,
    pub value: Value,
}

// ---------------------------------------------------------------------------
// TransactionKind / TransactionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    Transfer,
    ContractExecution,
}

/// Lifecycle: `Unsigned -> Pending -> Sent -> Confirmed | Failed`.
/// `Confirmed` and `Failed` are terminal and never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Unsigned,
    /// Gas parameters fixed, not yet broadcast.
    Pending,
    Sent,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Unsigned => "UNSIGNED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Sent => "SENT",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }

    /// Sent or pending: the stream reports these as ongoing.
    pub fn is_ongoing(self) -> bool {
        matches!(self, TransactionStatus::Sent | TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl ActionStatus {
    /// FAILED if any transaction failed, CONFIRMED if all confirmed, else PENDING.
    pub fn derive(transactions: &[ActionTransaction]) -> ActionStatus {
        if transactions
            .iter()
            .any(|t| t.status == TransactionStatus::Failed)
        {
            ActionStatus::Failed
        } else if transactions
            .iter()
            .all(|t| t.status == TransactionStatus::Confirmed)
        {
            ActionStatus::Confirmed
        } else {
            ActionStatus::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Confirmed => "CONFIRMED",
            ActionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    pub chain_id: ChainId,
    pub from: Address,
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasParameters {
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// An unsigned transaction with its gas parameters fixed, ready for the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransaction {
    #[serde(flatten)]
    pub transaction: UnsignedTransaction,
    #[serde(flatten)]
    pub gas: GasParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub transaction: UnsignedTransaction,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<GasParameters>,
    #[serde(default)]
    pub execution_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ActionTransaction {
    pub fn new(kind: TransactionKind, transaction: UnsignedTransaction) -> Self {
        Self {
            kind,
            transaction,
            status: TransactionStatus::Unsigned,
            hash: None,
            gas: None,
            execution_error: false,
            message: None,
            sent_at: None,
        }
    }

    /// Back to a fresh UNSIGNED transaction with no execution record.
    pub fn reset(&mut self) {
        self.status = TransactionStatus::Unsigned;
        self.hash = None;
        self.gas = None;
        self.execution_error = false;
        self.message = None;
        self.sent_at = None;
    }
}

/// Partial update applied to one persisted transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<GasParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(TransactionStatus::Failed),
            execution_error: Some(true),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn prepared(gas: GasParameters) -> Self {
        Self {
            status: Some(TransactionStatus::Pending),
            gas: Some(gas),
            ..Self::default()
        }
    }

    pub fn sent(hash: B256, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(TransactionStatus::Sent),
            hash: Some(hash),
            sent_at: Some(at),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply onto `tx`. A terminal transaction may not move to another status.
    pub fn apply(&self, action_id: Uuid, index: usize, tx: &mut ActionTransaction) -> Result<()> {
        if let Some(next) = self.status {
            if tx.status.is_terminal() && next != tx.status {
                return Err(PilotError::TransactionFinalized {
                    action_id,
                    index,
                    status: tx.status.to_string(),
                });
            }
            tx.status = next;
        }
        if let Some(hash) = self.hash {
            tx.hash = Some(hash);
        }
        if let Some(gas) = self.gas {
            tx.gas = Some(gas);
        }
        if let Some(flag) = self.execution_error {
            tx.execution_error = flag;
        }
        if let Some(message) = &self.message {
            tx.message = Some(message.clone());
        }
        if let Some(at) = self.sent_at {
            tx.sent_at = Some(at);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: Uuid,
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub protocol: String,
    pub chain_id: ChainId,
    #[serde(default)]
    pub args: Vec<ActionArg>,
    #[serde(default)]
    pub transactions: Vec<ActionTransaction>,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Action {
    pub fn new(kind: ActionKind, protocol: impl Into<String>, chain_id: ChainId) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            protocol: protocol.into(),
            chain_id,
            args: Vec::new(),
            transactions: Vec::new(),
            status: ActionStatus::Pending,
            warnings: Vec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, kind: ArgKind, value: impl Into<Value>) -> Self {
        self.args.push(ActionArg {
            name: name.into(),
            kind,
            value: value.into(),
        });
        self
    }

    pub fn push_transaction(&mut self, kind: TransactionKind, tx: UnsignedTransaction) {
        self.transactions.push(ActionTransaction::new(kind, tx));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn refresh_status(&mut self) {
        self.status = ActionStatus::derive(&self.transactions);
    }

    /// Apply a patch to one transaction and recompute the action status.
    pub fn apply_patch(&mut self, index: usize, patch: &TransactionPatch) -> Result<()> {
        let action_id = self.id;
        let tx = self
            .transactions
            .get_mut(index)
            .ok_or(PilotError::TransactionMissing { action_id, index })?;
        patch.apply(action_id, index, tx)?;
        self.refresh_status();
        Ok(())
    }
}
