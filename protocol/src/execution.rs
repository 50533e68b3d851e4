use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::ids::ExecutionId;
use crate::ids::SessionId;
use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub session_id: SessionId,
    pub language: Language,
    pub code: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub outputs: Vec<ExecutionOutput>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    pub fn new(session_id: SessionId, language: Language, code: String) -> Self {
        Self {
            id: ExecutionId::new(),
            session_id,
            language,
            code,
            status: ExecutionStatus::Pending,
            exit_code: None,
            outputs: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            execution_time_ms: None,
            peak_memory_bytes: None,
            error_message: None,
        }
    }

    pub fn finish(&mut self, status: ExecutionStatus, exit_code: Option<i32>) {
        let now = Utc::now();
        self.status = status;
        self.exit_code = exit_code;
        self.ended_at = Some(now);
        self.execution_time_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}
