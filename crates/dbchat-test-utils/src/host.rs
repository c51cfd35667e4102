//! Stub host environment recording notifications.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dbchat_core::{ConnectionInfo, HostEnvironment, HostError, TableRef};
use parking_lot::Mutex;
use serde_json::Value;

/// In-memory [`HostEnvironment`] with scriptable connection context.
#[derive(Default)]
pub struct StubHost {
    info: Mutex<Option<ConnectionInfo>>,
    tables: Mutex<Vec<TableRef>>,
    fail_calls: AtomicBool,
    notices: Mutex<Vec<(String, Value)>>,
}

impl StubHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(self, info: ConnectionInfo) -> Self {
        *self.info.lock() = Some(info);
        self
    }

    pub fn with_tables(self, tables: Vec<TableRef>) -> Self {
        *self.tables.lock() = tables;
        self
    }

    /// Make `connection_info` and `tables` fail, to exercise the
    /// prompt fallbacks.
    pub fn fail_calls(self) -> Self {
        self.fail_calls.store(true, Ordering::SeqCst);
        self
    }

    /// All notifications received, in order.
    pub fn notices(&self) -> Vec<(String, Value)> {
        self.notices.lock().clone()
    }

    /// Notification messages on one channel.
    pub fn messages_on(&self, channel: &str) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|(name, _)| name == channel)
            .filter_map(|(_, payload)| payload.get("message"))
            .filter_map(|message| message.as_str())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl HostEnvironment for StubHost {
    async fn connection_info(&self) -> Result<ConnectionInfo, HostError> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(HostError::Call("host unavailable".to_string()));
        }
        Ok(self.info.lock().clone().unwrap_or_default())
    }

    async fn tables(&self) -> Result<Vec<TableRef>, HostError> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(HostError::Call("host unavailable".to_string()));
        }
        Ok(self.tables.lock().clone())
    }

    fn notify(&self, channel: &str, payload: Value) {
        self.notices.lock().push((channel.to_string(), payload));
    }
}
