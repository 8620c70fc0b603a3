use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chainpilot_core::error::PilotError;

// ---------------------------------------------------------------------------
// Internal sentinels for explicit status codes
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Carries an explicit HTTP 404 through the `anyhow::Error` chain.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

/// Status code for a domain error.
pub fn status_for(err: &PilotError) -> StatusCode {
    match err {
        PilotError::SequenceNotFound(_)
        | PilotError::ActionMissing { .. }
        | PilotError::TransactionMissing { .. }
        | PilotError::ToolNotFound(_)
        | PilotError::ActionNotFound { .. } => StatusCode::NOT_FOUND,
        PilotError::Validation(_)
        | PilotError::UnknownActionKind(_)
        | PilotError::SequenceHasErrors(_)
        | PilotError::UnsupportedChain { .. }
        | PilotError::TokenNotFound { .. }
        | PilotError::ChainNotConfigured(_)
        | PilotError::Handler(_) => StatusCode::BAD_REQUEST,
        PilotError::DuplicateAction { .. }
        | PilotError::DuplicateDefault { .. }
        | PilotError::DuplicateProtocol(_)
        | PilotError::DuplicateTool(_)
        | PilotError::SequenceExists(_)
        | PilotError::TransactionFinalized { .. } => StatusCode::CONFLICT,
        PilotError::IncompleteInformation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PilotError::FeeEstimation(_)
        | PilotError::Signing(_)
        | PilotError::Broadcast(_)
        | PilotError::Rpc(_)
        | PilotError::ExternalApi(_)
        | PilotError::Http(_) => StatusCode::BAD_GATEWAY,
        PilotError::Store(_)
        | PilotError::Queue(_)
        | PilotError::Config(_)
        | PilotError::Io(_)
        | PilotError::Yaml(_)
        | PilotError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(e) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": e.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }
        if let Some(e) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": e.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }

        let (status, code) = match self.0.downcast_ref::<PilotError>() {
            Some(e) => (status_for(e), Some(e.code())),
            None => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = match code {
            Some(code) => serde_json::json!({ "error": self.0.to_string(), "code": code }),
            None => serde_json::json!({ "error": self.0.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
