//! In-memory tab store counting state writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use dbchat_core::{HostError, TabStore};
use parking_lot::Mutex;
use serde_json::Value;

/// In-memory [`TabStore`] for asserting on persistence behavior.
#[derive(Default)]
pub struct MemoryTabStore {
    states: Mutex<HashMap<String, Value>>,
    title: Mutex<Option<String>>,
    state_writes: AtomicUsize,
}

impl MemoryTabStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-set a title, for title-idempotence tests.
    pub fn with_title(self, title: impl Into<String>) -> Self {
        *self.title.lock() = Some(title.into());
        self
    }

    /// Number of `set_tab_state` calls so far.
    pub fn state_write_count(&self) -> usize {
        self.state_writes.load(Ordering::SeqCst)
    }

    /// Read back a stored value.
    pub fn state(&self, key: &str) -> Option<Value> {
        self.states.lock().get(key).cloned()
    }
}

impl TabStore for MemoryTabStore {
    fn set_tab_state(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.state_writes.fetch_add(1, Ordering::SeqCst);
        self.states.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn tab_state(&self, key: &str) -> Result<Option<Value>, HostError> {
        Ok(self.states.lock().get(key).cloned())
    }

    fn set_tab_title(&self, title: &str) -> Result<(), HostError> {
        *self.title.lock() = Some(title.to_string());
        Ok(())
    }

    fn conversation_title(&self) -> Option<String> {
        self.title.lock().clone()
    }
}
