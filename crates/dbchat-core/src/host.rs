//! Host-application surface: connection metadata, table listings,
//! notifications, and per-tab persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from host calls and tab-state persistence.
#[derive(Debug, Error)]
pub enum HostError {
    /// A host RPC failed.
    #[error("host call failed: {0}")]
    Call(String),
    /// Tab-state storage failed.
    #[error("tab state error: {0}")]
    State(String),
}

/// Metadata about the database connection the host currently has open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionInfo {
    /// Driver name, e.g. `postgresql` or `mongodb`.
    pub connection_type: String,
    /// Whether the host connection refuses writes.
    pub read_only_mode: bool,
    /// Connected database name.
    pub database_name: String,
    /// Default schema, empty when the driver has none.
    pub default_schema: String,
}

impl Default for ConnectionInfo {
    /// Values substituted when the host cannot be reached.
    fn default() -> Self {
        Self {
            connection_type: "unknown".to_string(),
            read_only_mode: false,
            database_name: "unknown".to_string(),
            default_schema: String::new(),
        }
    }
}

/// A table (or collection) visible on the host connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRef {
    /// Table name.
    pub name: String,
    /// Owning schema, when the driver has schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// The host application the session runs inside.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// Current connection metadata.
    async fn connection_info(&self) -> Result<ConnectionInfo, HostError>;

    /// Tables visible on the current connection.
    async fn tables(&self) -> Result<Vec<TableRef>, HostError>;

    /// Fire-and-forget notification to the host surface.
    fn notify(&self, channel: &str, payload: Value);
}

/// Per-tab persistence collaborator.
pub trait TabStore: Send + Sync {
    /// Persist a state value under a key, replacing any previous value.
    fn set_tab_state(&self, key: &str, value: Value) -> Result<(), HostError>;

    /// Read back a persisted state value.
    fn tab_state(&self, key: &str) -> Result<Option<Value>, HostError>;

    /// Set the tab title.
    fn set_tab_title(&self, title: &str) -> Result<(), HostError>;

    /// Current conversation title, if one has been set.
    fn conversation_title(&self) -> Option<String>;
}
