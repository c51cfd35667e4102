//! Test helpers shared across dbchat crates.

pub mod host;
pub mod local;
pub mod sink;
pub mod tabs;
pub mod tools;
pub mod transport;

pub use host::StubHost;
pub use local::StubLocalApi;
pub use sink::CollectingSink;
pub use tabs::MemoryTabStore;
pub use tools::{FailingTool, RecordingTool};
pub use transport::{ScriptItem, ScriptedTransport};
