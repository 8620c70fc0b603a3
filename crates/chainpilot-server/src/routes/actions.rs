use alloy_primitives::Address;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chainpilot_core::invocation::InvocationContext;
use chainpilot_core::sequence::ParsedAction;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_address: Option<Address>,
    pub actions: Vec<ParsedAction>,
}

/// POST /api/actions/invoke: build a draft sequence from parsed tasks.
///
/// Answers 422 with the need-more-information request when any task has
/// missing or unclear parameters; no handler runs in that case. An empty
/// batch yields an empty draft.
pub async fn invoke(State(app): State<AppState>, Json(body): Json<InvokeBody>) -> Response {
    if let Some(request) = app.engine.information_request(&body.actions) {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(request)).into_response();
    }

    let ctx = InvocationContext {
        user_id: body.user_id,
        user_address: body.user_address,
    };
    let draft = app.engine.invoke(body.actions, &ctx).await;
    Json(draft).into_response()
}
