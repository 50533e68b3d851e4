//! The one contract §6 promises the transport layer: `POST /exec`, body is
//! an `ExecRequest`, response is an `ExecResponse` whenever the pipeline
//! itself completes — including when the user's own code failed or timed
//! out, which are 200-status outcomes recorded on the response body, not
//! HTTP errors (§7).

use axum::extract::State;
use axum::Json;
use cellbox_protocol::http::{ExecRequest, ExecResponse};

use crate::error::ServerError;
use crate::state::AppState;

pub async fn exec_handler(State(state): State<AppState>, Json(request): Json<ExecRequest>) -> Result<Json<ExecResponse>, ServerError> {
    let response = state.orchestrator.execute(request).await?;
    Ok(Json(response))
}
