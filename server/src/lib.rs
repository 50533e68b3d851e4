//! The HTTP surface (§6): the exec endpoint plus thin upload/download and
//! state-upload endpoints, wired over the orchestrator built by
//! `cellbox-exec`. Everything below this layer — pooling, isolation,
//! storage — is someone else's crate; this one only turns HTTP requests
//! into calls against it and calls back into serde for the wire shapes
//! `cellbox-protocol` defines.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::ServerConfig;
pub use error::ServerError;
pub use routes::build_router;
pub use state::AppState;
