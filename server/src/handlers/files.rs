//! Thin upload/download endpoints (§8 scenario 6: upload a file, run code
//! that rewrites it, download the new content; an agent file stays
//! immutable across the same round trip). These only move bytes and
//! metadata in and out of `cellbox-store`'s `FileStore` — the orchestrator
//! is the only thing that ever mounts, rewrites, or harvests a file during
//! an execution.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use cellbox_protocol::{FileId, SessionId, StoredFile};
use chrono::Utc;

use crate::error::ServerError;
use crate::state::AppState;

/// Multipart fields: `session_id` (required), `entity_id` (optional —
/// its presence marks the upload an agent file, §3 "Stored file"), and a
/// `file` part carrying both the bytes and the original filename.
pub async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<StoredFile>, ServerError> {
    let mut session_id: Option<SessionId> = None;
    let mut entity_id: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut bytes: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ServerError::Validation(e.to_string()))? {
        match field.name().unwrap_or("") {
            "session_id" => {
                let text = field.text().await.map_err(|e| ServerError::Validation(e.to_string()))?;
                session_id = Some(SessionId::from_string(text));
            }
            "entity_id" => {
                entity_id = Some(field.text().await.map_err(|e| ServerError::Validation(e.to_string()))?);
            }
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(field.bytes().await.map_err(|e| ServerError::Validation(e.to_string()))?);
            }
            _ => {}
        }
    }

    let session_id = session_id.ok_or_else(|| ServerError::Validation("missing session_id field".to_string()))?;
    let bytes = bytes.ok_or_else(|| ServerError::Validation("missing file field".to_string()))?;
    let filename = filename.ok_or_else(|| ServerError::Validation("uploaded file part has no filename".to_string()))?;

    let file_id = FileId::new();
    let object_key = format!("sessions/{}/uploads/{}", session_id.as_str(), file_id);
    let content_type = cellbox_exec::guess_mime_type(&filename);

    let stored = StoredFile {
        id: file_id,
        session_id,
        filename,
        object_key: object_key.clone(),
        size: bytes.len() as u64,
        content_type,
        created_at: Utc::now(),
        state_hash: None,
        execution_id: None,
        last_used_at: None,
        is_agent_file: entity_id.is_some(),
    };

    state.files.put_bytes(&object_key, bytes).await?;
    state.files.put_metadata(&stored).await?;

    Ok(Json(stored))
}

pub async fn download_handler(State(state): State<AppState>, Path((session_id, file_id)): Path<(String, String)>) -> Result<Response, ServerError> {
    let session_id = SessionId::from_string(session_id);
    let file_id: FileId = file_id.parse().map_err(|_| ServerError::NotFound)?;

    let metadata = state.files.get_metadata(&session_id, &file_id).await?.ok_or(ServerError::NotFound)?;
    let bytes = state.files.get_bytes(&metadata.object_key).await?.ok_or(ServerError::NotFound)?;

    Ok((
        [
            (header::CONTENT_TYPE, metadata.content_type.clone()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", metadata.filename)),
        ],
        bytes,
    )
        .into_response())
}
