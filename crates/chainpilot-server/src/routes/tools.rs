use axum::extract::{Path, State};
use axum::Json;
use chainpilot_core::tools::{ToolOutcome, ToolSpec};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/tools: every registered tool with its input schema.
pub async fn list_tools(State(app): State<AppState>) -> Json<Vec<ToolSpec>> {
    Json(app.engine.tools.get_all())
}

/// POST /api/tools/{name}: run one tool.
///
/// Tool failures are part of the outcome body; only an unknown name is an
/// HTTP error.
pub async fn execute_tool(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(args): Json<serde_json::Value>,
) -> Result<Json<ToolOutcome>, AppError> {
    if !app.engine.tools.contains(&name) {
        return Err(AppError::not_found(format!("tool not found: {name}")));
    }
    Ok(Json(app.engine.tools.execute(&name, args).await))
}
