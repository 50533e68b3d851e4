//! The REPL process handle and driver-side executor (§4.3): owns a running
//! `python3 /opt/repl_server.py` child inside a sandbox's namespaces, speaks
//! the length-delimited JSON protocol to it, and enforces the overall
//! deadlines around each request. The driver script itself
//! (`assets/repl_server.py`) is shipped as-is, per §9 Design Notes
//! ("the REPL driver itself... retained as-is") — it is not translated to
//! Rust, only the Rust-side client that talks to it.

pub mod error;
pub mod executor;
pub mod handle;
pub mod pipe;

pub use error::{ReplError, Result};
pub use executor::{check_health, execute, execute_with_state, ReplExecutionOutcome};
pub use handle::ReplHandle;

/// The fixed driver script path inside the runtime image (§4.3).
pub const REPL_DRIVER_PATH: &str = "/opt/repl_server.py";
