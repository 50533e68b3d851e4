//! HTTP-layer error mapping (§7: "Response status 4xx only for validation
//! errors ... 503 for sandbox unavailability, 500 for internal orchestrator
//! faults"). A failed or timed-out user execution is never represented
//! here — that is a 200-status `ExecResponse`, handled entirely inside
//! `cellbox_exec::Orchestrator::execute`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("sandbox service unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("state upload rejected: {0}")]
    BadState(String),

    #[error(transparent)]
    Exec(#[from] cellbox_exec::ExecError),

    #[error(transparent)]
    Store(#[from] cellbox_store::StoreError),

    #[error("not found")]
    NotFound,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Validation(_) | ServerError::BadState(_) => StatusCode::BAD_REQUEST,
            ServerError::SandboxUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Exec(cellbox_exec::ExecError::Validation(_)) => StatusCode::BAD_REQUEST,
            ServerError::Exec(cellbox_exec::ExecError::SandboxUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Exec(_) | ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ServerError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn validation_and_bad_state_map_to_bad_request() {
        assert_eq!(status_of(ServerError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ServerError::BadState("bad version byte".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn sandbox_unavailable_maps_to_service_unavailable() {
        assert_eq!(status_of(ServerError::SandboxUnavailable("pool exhausted".into())), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_of(ServerError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn exec_validation_and_sandbox_unavailable_pass_through_their_status() {
        assert_eq!(
            status_of(ServerError::Exec(cellbox_exec::ExecError::Validation("bad request".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServerError::Exec(cellbox_exec::ExecError::SandboxUnavailable(cellbox_pool::PoolError::NotRunning))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn other_exec_and_store_faults_map_to_internal_server_error() {
        assert_eq!(
            status_of(ServerError::Store(cellbox_store::StoreError::Blob("bucket unreachable".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
