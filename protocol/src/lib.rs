//! Shared wire and data types for the code-execution core: REPL framing,
//! the serialized-state envelope, session/execution/file records, the event
//! bus's event type, and the HTTP exec contract. Every other crate in this
//! workspace depends on this one; it depends on nothing else in-workspace.

pub mod event;
pub mod execution;
pub mod files;
pub mod http;
pub mod ids;
pub mod language;
pub mod repl;
pub mod session;
pub mod state;

pub use event::Event;
pub use execution::ExecutionRecord;
pub use execution::ExecutionStatus;
pub use files::FileId;
pub use files::StoredFile;
pub use ids::ExecutionId;
pub use ids::SandboxId;
pub use ids::SessionId;
pub use language::Language;
pub use session::Session;
pub use session::SessionStatus;
pub use state::SerializedState;
