//! Session orchestration for dbchat: the permission gate, host
//! surface, prompt assembly, tab persistence, and the chat session
//! itself.

pub mod error;
pub mod gate;
pub mod host;
pub mod prompt;
pub mod session;
pub mod state;

pub use error::ChatError;
pub use gate::{Decision, GateError, PendingPermission, PermissionGate};
pub use host::{ConnectionInfo, HostEnvironment, HostError, TableRef, TabStore};
pub use session::{ChatSession, SessionStatus};
pub use state::JsonlTabStore;
