use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chainpilot_core::sequence::{ActionSequence, StoredSequence};
use serde::Deserialize;

use super::{blocking, sequence_id};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBody {
    #[serde(default)]
    pub user_id: Option<String>,
    pub sequence: ActionSequence,
}

/// POST /api/sequences: persist a confirmed draft.
///
/// Drafts that still carry error results are rejected with 400.
pub async fn save_sequence(
    State(app): State<AppState>,
    Json(body): Json<SaveBody>,
) -> Result<(StatusCode, Json<StoredSequence>), AppError> {
    let user_id = body
        .user_id
        .or_else(|| body.sequence.user_id.clone())
        .ok_or_else(|| AppError::bad_request("userId is required"))?;
    let engine = app.engine.clone();
    let saved = blocking(move || engine.save(body.sequence, &user_id)).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: Option<String>,
}

/// GET /api/sequences?user_id=: stored sequences, newest first when filtered by user.
pub async fn list_sequences(
    State(app): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<StoredSequence>>, AppError> {
    let store = app.engine.store.clone();
    let sequences = blocking(move || match q.user_id {
        Some(user) => store.list_by_user(&user),
        None => store.list(),
    })
    .await?;
    Ok(Json(sequences))
}

/// GET /api/sequences/{id}
pub async fn get_sequence(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredSequence>, AppError> {
    let id = sequence_id(&id)?;
    let store = app.engine.store.clone();
    let sequence = blocking(move || store.get(id)).await?;
    Ok(Json(sequence))
}

/// DELETE /api/sequences/{id}
pub async fn delete_sequence(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = sequence_id(&id)?;
    let store = app.engine.store.clone();
    if !blocking(move || store.delete(id)).await? {
        return Err(AppError::not_found(format!("sequence not found: {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub wallet_id: String,
}

/// POST /api/sequences/{id}/execute: start execution in the background.
///
/// Answers 202 once the sequence is known to exist; progress is observed
/// through the stream endpoint.
pub async fn execute_sequence(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ExecuteBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let id = sequence_id(&id)?;
    if body.wallet_id.trim().is_empty() {
        return Err(AppError::bad_request("walletId is required"));
    }
    let store = app.engine.store.clone();
    blocking(move || store.get(id)).await?;

    let engine = app.engine.clone();
    let wallet_id = body.wallet_id;
    tokio::spawn(async move {
        match engine.execute(id, &wallet_id).await {
            Ok(report) => tracing::info!(
                sequence_id = %id,
                confirmed = report.confirmed,
                failed = report.failed,
                outstanding = report.outstanding,
                "background execution finished"
            ),
            Err(e) => tracing::error!(sequence_id = %id, error = %e, "background execution failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "sequenceId": id, "status": "executing" })),
    ))
}

/// POST /api/sequences/{id}/reconcile: check in-flight transactions now.
pub async fn reconcile_sequence(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = sequence_id(&id)?;
    let report = app.engine.reconcile(id).await?;
    Ok(Json(serde_json::to_value(report)?))
}
