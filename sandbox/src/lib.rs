pub mod descriptor;
pub mod error;
pub mod executor;
pub mod isolation;
pub mod manager;
pub mod spawn;

pub use descriptor::SandboxDescriptor;
pub use error::{Result, SandboxError};
pub use executor::{run_one_shot, OneShotOutcome, OneShotSpec};
pub use isolation::{masked_host_paths, IsolationPlan};
pub use manager::SandboxManager;
pub use spawn::{spawn_isolated, SpawnSpec, SpawnedChild};
