use std::sync::Arc;

use cellbox_exec::Orchestrator;
use cellbox_store::{FileStore, StateStore};

/// Shared handles every handler closes over. Cheap to clone: everything
/// inside is already behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub files: Arc<FileStore>,
    pub states: Arc<StateStore>,
}
