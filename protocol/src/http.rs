use serde::Deserialize;
use serde::Serialize;

use crate::files::FileId;
use crate::ids::SessionId;

/// The incoming `args` field may be absent, a bare string, or a list (§4.6
/// Argument normalization). `serde(untagged)` mirrors that loosely-typed
/// wire shape; `cellbox-exec` does the actual normalization into a
/// `Vec<String>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawArgs {
    Single(String),
    List(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRefRequest {
    pub id: FileId,
    pub session_id: SessionId,
    pub name: String,
    #[serde(default)]
    pub restore_state: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub code: String,
    pub lang: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<FileRefRequest>>,
    #[serde(default)]
    pub args: Option<RawArgs>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFileRef {
    pub id: FileId,
    pub name: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecResponse {
    pub session_id: SessionId,
    pub files: Vec<GeneratedFileRef>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}
