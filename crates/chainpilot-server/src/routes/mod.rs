pub mod actions;
pub mod protocols;
pub mod sequences;
pub mod stream;
pub mod tools;

use crate::error::AppError;
use axum::Json;

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run a blocking store call off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> chainpilot_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(result)
}

/// Parse a path segment as a sequence id.
pub(crate) fn sequence_id(raw: &str) -> Result<uuid::Uuid, AppError> {
    raw.parse::<uuid::Uuid>()
        .map_err(|_| AppError::bad_request(format!("invalid sequence id: {raw}")))
}
