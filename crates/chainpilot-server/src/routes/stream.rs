use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use std::convert::Infallible;
use tokio_stream::StreamExt as _;

use super::sequence_id;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/sequences/{id}/stream: SSE status snapshots until every
/// transaction is terminal.
///
/// Each poll is a `status` event; a read failure ends the stream with one
/// `error` event.
pub async fn stream_sequence(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = sequence_id(&id)?;
    let snapshots = app.engine.watch(id).map(|item| {
        let event = match item {
            Ok(snapshot) => Event::default()
                .event("status")
                .json_data(&snapshot)
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
            Err(e) => Event::default()
                .event("error")
                .data(serde_json::json!({ "error": e.to_string(), "code": e.code() }).to_string()),
        };
        Ok::<Event, Infallible>(event)
    });
    Ok(Sse::new(snapshots).keep_alive(KeepAlive::default()))
}
