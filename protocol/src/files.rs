use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::ids::ExecutionId;
use crate::ids::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Metadata for one stored file (§3 Stored file). The body lives in the
/// blob store under `object_key`; this record lives in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub session_id: SessionId,
    pub filename: String,
    pub object_key: String,
    pub size: u64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// True when uploaded with an entity identifier; such files are
    /// immutable from user code's perspective (§3 Ownership, §4.6 step 9).
    pub is_agent_file: bool,
}

impl StoredFile {
    /// Files from other sessions and agent files are read-only and never
    /// rewritten by an execution (§4.6 step 9).
    pub fn is_writable_by(&self, session_id: &SessionId) -> bool {
        !self.is_agent_file && &self.session_id == session_id
    }
}
