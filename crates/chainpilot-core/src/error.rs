use crate::params::ValidationIssue;
use crate::types::ChainId;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Action {action} not found for protocol {}", .protocol.as_deref().unwrap_or("<default>"))]
    ActionNotFound {
        action: String,
        protocol: Option<String>,
    },

    #[error("unknown action kind: {0}")]
    UnknownActionKind(String),

    #[error("Validation error: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("{0}")]
    Handler(String),

    #[error("protocol '{protocol}' does not support chain {chain_id}")]
    UnsupportedChain { protocol: String, chain_id: ChainId },

    #[error("missing or unclear parameters: {0}")]
    IncompleteInformation(String),

    #[error("token '{token}' not found on chain {chain_id}")]
    TokenNotFound { chain_id: ChainId, token: String },

    #[error("no RPC client configured for chain {0}")]
    ChainNotConfigured(ChainId),

    #[error("{0}")]
    FeeEstimation(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("external api error: {0}")]
    ExternalApi(String),

    #[error("sequence not found: {0}")]
    SequenceNotFound(Uuid),

    #[error("action {action_id} not found in sequence {sequence_id}")]
    ActionMissing { sequence_id: Uuid, action_id: Uuid },

    #[error("transaction {index} not found in action {action_id}")]
    TransactionMissing { action_id: Uuid, index: usize },

    #[error("transaction {index} in action {action_id} is already {status}")]
    TransactionFinalized {
        action_id: Uuid,
        index: usize,
        status: String,
    },

    #[error("sequence already exists: {0}")]
    SequenceExists(Uuid),

    #[error("sequence contains {0} failed action(s); remove them before saving")]
    SequenceHasErrors(usize),

    #[error("action {action} is already registered for protocol {protocol}")]
    DuplicateAction { action: String, protocol: String },

    #[error("action {action} already has default protocol {existing}; {protocol} cannot also be default")]
    DuplicateDefault {
        action: String,
        existing: String,
        protocol: String,
    },

    #[error("protocol already registered: {0}")]
    DuplicateProtocol(String),

    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl PilotError {
    /// Stable machine-readable code carried by error results.
    pub fn code(&self) -> &'static str {
        match self {
            PilotError::ActionNotFound { .. } => "ACTION_NOT_FOUND",
            PilotError::UnknownActionKind(_) => "UNKNOWN_ACTION_KIND",
            PilotError::Validation(_) => "VALIDATION_ERROR",
            PilotError::Handler(_) => "HANDLER_ERROR",
            PilotError::UnsupportedChain { .. } => "UNSUPPORTED_CHAIN",
            PilotError::IncompleteInformation(_) => "INCOMPLETE_INFORMATION",
            PilotError::TokenNotFound { .. } => "TOKEN_NOT_FOUND",
            PilotError::ChainNotConfigured(_) => "CHAIN_NOT_CONFIGURED",
            PilotError::FeeEstimation(_) => "FEE_ESTIMATION_ERROR",
            PilotError::Signing(_) => "SIGNING_ERROR",
            PilotError::Broadcast(_) => "BROADCAST_ERROR",
            PilotError::Rpc(_) => "RPC_ERROR",
            PilotError::ExternalApi(_) => "EXTERNAL_API_ERROR",
            PilotError::SequenceNotFound(_) => "SEQUENCE_NOT_FOUND",
            PilotError::ActionMissing { .. } => "ACTION_MISSING",
            PilotError::TransactionMissing { .. } => "TRANSACTION_MISSING",
            PilotError::TransactionFinalized { .. } => "TRANSACTION_FINALIZED",
            PilotError::SequenceExists(_) => "SEQUENCE_EXISTS",
            PilotError::SequenceHasErrors(_) => "SEQUENCE_HAS_ERRORS",
            PilotError::DuplicateAction { .. } => "DUPLICATE_ACTION",
            PilotError::DuplicateDefault { .. } => "DUPLICATE_DEFAULT",
            PilotError::DuplicateProtocol(_) => "DUPLICATE_PROTOCOL",
            PilotError::DuplicateTool(_) => "DUPLICATE_TOOL",
            PilotError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            PilotError::Store(_) => "STORE_ERROR",
            PilotError::Queue(_) => "QUEUE_ERROR",
            PilotError::Config(_) => "CONFIG_ERROR",
            PilotError::Io(_) => "IO_ERROR",
            PilotError::Yaml(_) => "YAML_ERROR",
            PilotError::Json(_) => "JSON_ERROR",
            PilotError::Http(_) => "HTTP_ERROR",
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| {
            if i.path.is_empty() {
                i.message.clone()
            } else {
                format!("{}: {}", i.path, i.message)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PilotError>;
