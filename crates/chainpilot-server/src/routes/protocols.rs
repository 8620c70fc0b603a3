use axum::extract::State;
use axum::Json;
use chainpilot_core::registry::ProtocolSummary;

use crate::state::AppState;

/// GET /api/protocols: registered protocols with their actions and parameter schemas.
pub async fn list_protocols(State(app): State<AppState>) -> Json<Vec<ProtocolSummary>> {
    Json(app.engine.protocols.summaries())
}

/// GET /api/protocols/describe: the plain-text catalogue used in system prompts.
pub async fn describe_protocols(State(app): State<AppState>) -> String {
    app.engine.describe_protocols()
}
