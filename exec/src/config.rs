//! Orchestrator configuration (§6 "Environment variables consumed", §8
//! boundary behaviors). Grounded on `config/__init__.py`'s `Settings` fields
//! of the same names and bounds.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub max_execution_time: Duration,
    pub max_file_size_mb: u64,
    pub max_files_per_session: usize,
    pub max_output_files: usize,
    pub state_persistence_enabled: bool,
    /// Whether a failed (but not timed-out) execution still captures state
    /// (§4.6 step 8, §7 "execution succeeded (or the capture-on-error flag
    /// is set)").
    pub capture_state_on_error: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_execution_time: Duration::from_secs(120),
            max_file_size_mb: 100,
            max_files_per_session: 50,
            max_output_files: 10,
            state_persistence_enabled: true,
            capture_state_on_error: true,
        }
    }
}

impl ExecConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_execution_time: Duration::from_secs(
                cellbox_common::env_or("CELLBOX_MAX_EXECUTION_TIME", default.max_execution_time.as_secs())
                    .clamp(1, 300),
            ),
            max_file_size_mb: cellbox_common::env_or("CELLBOX_MAX_FILE_SIZE_MB", default.max_file_size_mb).clamp(1, 500),
            max_files_per_session: cellbox_common::env_or(
                "CELLBOX_MAX_FILES_PER_SESSION",
                default.max_files_per_session as u64,
            )
            .clamp(1, 200) as usize,
            max_output_files: cellbox_common::env_or("CELLBOX_MAX_OUTPUT_FILES", default.max_output_files as u64)
                .clamp(1, 50) as usize,
            state_persistence_enabled: cellbox_common::env_or(
                "CELLBOX_STATE_PERSISTENCE_ENABLED",
                default.state_persistence_enabled,
            ),
            capture_state_on_error: cellbox_common::env_or(
                "CELLBOX_CAPTURE_STATE_ON_ERROR",
                default.capture_state_on_error,
            ),
        }
    }
}
