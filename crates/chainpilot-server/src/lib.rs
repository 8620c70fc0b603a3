pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use chainpilot_core::engine::Engine;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let app_state = state::AppState::new(engine);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/actions/invoke", post(routes::actions::invoke))
        .route(
            "/api/sequences",
            get(routes::sequences::list_sequences).post(routes::sequences::save_sequence),
        )
        .route(
            "/api/sequences/{id}",
            get(routes::sequences::get_sequence).delete(routes::sequences::delete_sequence),
        )
        .route(
            "/api/sequences/{id}/execute",
            post(routes::sequences::execute_sequence),
        )
        .route(
            "/api/sequences/{id}/reconcile",
            post(routes::sequences::reconcile_sequence),
        )
        .route("/api/sequences/{id}/stream", get(routes::stream::stream_sequence))
        .route("/api/protocols", get(routes::protocols::list_protocols))
        .route(
            "/api/protocols/describe",
            get(routes::protocols::describe_protocols),
        )
        .route("/api/tools", get(routes::tools::list_tools))
        .route("/api/tools/{name}", post(routes::tools::execute_tool))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the API on `0.0.0.0:{port}` until the process is stopped.
pub async fn serve(engine: Arc<Engine>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(engine, listener).await
}

/// Serve on an already-bound listener, so callers can bind port 0 and read
/// the chosen port first.
pub async fn serve_on(engine: Arc<Engine>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(engine);

    tracing::info!(port = actual_port, "chainpilot API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
