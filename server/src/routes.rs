use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::exec::exec_handler;
use crate::handlers::files::{download_handler, upload_handler};
use crate::handlers::state::upload_state_handler;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/exec", post(exec_handler))
        .route("/files", post(upload_handler))
        .route("/sessions/{session_id}/files/{file_id}", get(download_handler))
        .route("/sessions/{session_id}/state", post(upload_state_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
