use crate::error::{PilotError, Result};
use crate::types::{
    Action, ActionKind, ActionTransaction, ChainId, TransactionPatch, TransactionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ParsedAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamIssue {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One task as understood by the intent parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAction {
    pub task: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
    pub chain_id: ChainId,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub missing_params: Vec<ParamIssue>,
    #[serde(default)]
    pub unclear_params: Vec<ParamIssue>,
}

impl ParsedAction {
    pub fn is_complete(&self) -> bool {
        self.missing_params.is_empty() && self.unclear_params.is_empty()
    }

    /// The per-task block of a need-more-information message, if any.
    pub fn information_needed(&self) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        let mut text = format!("For task \"{}\":", self.task);
        if !self.missing_params.is_empty() {
            text.push_str(&format!("\nMissing parameters: {}", describe(&self.missing_params)));
        }
        if !self.unclear_params.is_empty() {
            text.push_str(&format!("\nUnclear parameters: {}", describe(&self.unclear_params)));
        }
        Some(text)
    }
}

fn describe(issues: &[ParamIssue]) -> String {
    issues
        .iter()
        .map(|p| {
            if p.description.is_empty() {
                p.name.clone()
            } else {
                format!("{} ({})", p.name, p.description)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Structured "need more information" answer returned before any handler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformationRequest {
    pub error: String,
    pub message: String,
    pub missing_params: Vec<ParamIssue>,
    pub unclear_params: Vec<ParamIssue>,
}

impl InformationRequest {
    /// Collect every incomplete task. `None` when all tasks are complete.
    pub fn from_parsed(parsed: &[ParsedAction]) -> Option<Self> {
        let blocks: Vec<String> = parsed.iter().filter_map(|p| p.information_needed()).collect();
        if blocks.is_empty() {
            return None;
        }
        Some(Self {
            error: "Missing or unclear parameters".to_string(),
            message: format!(
                "I need more information to process your request:\n{}\n\nPlease provide these details so I can help you better.",
                blocks.join("\n\n")
            ),
            missing_params: parsed.iter().flat_map(|p| p.missing_params.clone()).collect(),
            unclear_params: parsed.iter().flat_map(|p| p.unclear_params.clone()).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// ActionResult / ActionSequence
// ---------------------------------------------------------------------------

/// Outcome of invoking one parsed action: either an Action or an error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub error: bool,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResult {
    pub fn ok(description: impl Into<String>, action: Action) -> Self {
        Self {
            error: false,
            description: description.into(),
            data: Some(action),
            code: None,
            message: None,
        }
    }

    pub fn failed(description: impl Into<String>, err: &PilotError) -> Self {
        Self {
            error: true,
            description: description.into(),
            data: None,
            code: Some(err.code().to_string()),
            message: Some(err.to_string()),
        }
    }
}

/// Result of one invocation batch: one ActionResult per parsed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSequence {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub actions: Vec<ActionResult>,
    pub created_at: DateTime<Utc>,
}

impl ActionSequence {
    pub fn new(user_id: Option<String>, actions: Vec<ActionResult>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            actions,
            created_at: Utc::now(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.actions.iter().filter(|a| a.error).count()
    }
}

// ---------------------------------------------------------------------------
// StoredSequence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAction {
    pub description: String,
    #[serde(flatten)]
    pub action: Action,
}

/// A confirmed sequence as persisted: every action is executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSequence {
    pub id: Uuid,
    pub user_id: String,
    pub actions: Vec<StoredAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredSequence {
    /// Accept a draft for persistence. Drafts carrying error results are rejected.
    pub fn from_draft(draft: ActionSequence, user_id: impl Into<String>) -> Result<Self> {
        let errors = draft.error_count();
        if errors > 0 {
            return Err(PilotError::SequenceHasErrors(errors));
        }
        let actions = draft
            .actions
            .into_iter()
            .filter_map(|r| {
                r.data.map(|mut action| {
                    // Execution state is never taken from the client.
                    action.transactions.iter_mut().for_each(ActionTransaction::reset);
                    action.refresh_status();
                    StoredAction {
                        description: r.description,
                        action,
                    }
                })
            })
            .collect();
        let now = Utc::now();
        Ok(Self {
            id: draft.id,
            user_id: user_id.into(),
            actions,
            created_at: draft.created_at,
            updated_at: now,
        })
    }

    pub fn action_mut(&mut self, action_id: Uuid) -> Result<&mut Action> {
        let sequence_id = self.id;
        self.actions
            .iter_mut()
            .map(|a| &mut a.action)
            .find(|a| a.id == action_id)
            .ok_or(PilotError::ActionMissing {
                sequence_id,
                action_id,
            })
    }

    /// Patch one transaction, recompute its action's status, and return the action.
    pub fn apply_patch(
        &mut self,
        action_id: Uuid,
        index: usize,
        patch: &TransactionPatch,
    ) -> Result<Action> {
        let action = self.action_mut(action_id)?;
        action.apply_patch(index, patch)?;
        let updated = action.clone();
        self.updated_at = Utc::now();
        Ok(updated)
    }

    pub fn statuses(&self) -> impl Iterator<Item = TransactionStatus> + '_ {
        self.actions
            .iter()
            .flat_map(|a| a.action.transactions.iter().map(|t| t.status))
    }

    pub fn all_terminal(&self) -> bool {
        self.statuses().all(|s| s.is_terminal())
    }

    pub fn has_failed(&self) -> bool {
        self.statuses().any(|s| s == TransactionStatus::Failed)
    }

    pub fn has_ongoing(&self) -> bool {
        self.statuses().any(|s| s.is_ongoing())
    }
}
