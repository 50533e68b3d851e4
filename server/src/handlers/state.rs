//! State upload endpoint (§3 `state:upload_marker:<session_id>`, §8
//! "State upload with an unknown version byte → HTTP 400, state_store
//! unchanged"). The only validation that happens here is the same
//! version-byte/size check `cellbox_protocol::state::SerializedState`
//! already does for every other state path; everything else is handed
//! straight to `StateStore::upload`.

use axum::extract::{Path, State};
use axum::Json;
use cellbox_protocol::state::SerializedState;
use cellbox_protocol::SessionId;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadStateRequest {
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct UploadStateResponse {
    pub state_hash: String,
}

pub async fn upload_state_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UploadStateRequest>,
) -> Result<Json<UploadStateResponse>, ServerError> {
    // Validate before touching the store: a bad version byte must leave
    // state_store untouched, not partially written.
    SerializedState::from_base64(&request.state).map_err(|e| ServerError::BadState(e.to_string()))?;

    let session_id = SessionId::from_string(session_id);
    let state_hash = state.states.upload(&session_id, &request.state).await?;

    Ok(Json(UploadStateResponse { state_hash }))
}
