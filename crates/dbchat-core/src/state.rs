//! JSONL-backed tab persistence. Each tab gets one append-only file;
//! reads replay the file and keep the last value per key.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::host::{HostError, TabStore};

const SCHEMA_VERSION: u32 = 1;

/// One line in a tab rollout file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TabEvent {
    SchemaVersion { version: u32 },
    State { key: String, value: Value },
    Title { title: String },
}

/// JSONL-file implementation of [`TabStore`].
pub struct JsonlTabStore {
    root: PathBuf,
    tab_id: Uuid,
    /// Serialize write access to the rollout file.
    write_lock: Mutex<()>,
}

impl JsonlTabStore {
    /// Create a store for one tab under the given root directory.
    pub fn new(root: impl AsRef<Path>, tab_id: Uuid) -> Result<Self, HostError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|err| HostError::State(err.to_string()))?;
        info!(
            "initialized tab store (root={}, tab_id={})",
            root.display(),
            tab_id
        );
        Ok(Self {
            root,
            tab_id,
            write_lock: Mutex::new(()),
        })
    }

    fn rollout_path(&self) -> PathBuf {
        self.root.join(format!("{}.jsonl", self.tab_id))
    }

    fn write_event(&self, event: &TabEvent) -> Result<(), HostError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path();
        let fresh = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| HostError::State(err.to_string()))?;
        if fresh {
            let header = serde_json::to_string(&TabEvent::SchemaVersion {
                version: SCHEMA_VERSION,
            })
            .map_err(|err| HostError::State(err.to_string()))?;
            writeln!(file, "{header}").map_err(|err| HostError::State(err.to_string()))?;
        }
        let line = serde_json::to_string(event).map_err(|err| HostError::State(err.to_string()))?;
        writeln!(file, "{line}").map_err(|err| HostError::State(err.to_string()))?;
        Ok(())
    }

    fn replay(&self) -> Result<(HashMap<String, Value>, Option<String>), HostError> {
        let path = self.rollout_path();
        let mut states = HashMap::new();
        let mut title = None;
        if !path.exists() {
            return Ok((states, title));
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|err| HostError::State(err.to_string()))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| HostError::State(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: TabEvent =
                serde_json::from_str(&line).map_err(|err| HostError::State(err.to_string()))?;
            match event {
                TabEvent::SchemaVersion { version } => {
                    if version > SCHEMA_VERSION {
                        return Err(HostError::State(format!(
                            "unsupported schema version: {version}"
                        )));
                    }
                }
                TabEvent::State { key, value } => {
                    states.insert(key, value);
                }
                TabEvent::Title { title: value } => {
                    title = Some(value);
                }
            }
        }
        Ok((states, title))
    }
}

impl TabStore for JsonlTabStore {
    fn set_tab_state(&self, key: &str, value: Value) -> Result<(), HostError> {
        debug!(
            "persisting tab state (tab_id={}, key={})",
            self.tab_id, key
        );
        self.write_event(&TabEvent::State {
            key: key.to_string(),
            value,
        })
    }

    fn tab_state(&self, key: &str) -> Result<Option<Value>, HostError> {
        let (mut states, _) = self.replay()?;
        Ok(states.remove(key))
    }

    fn set_tab_title(&self, title: &str) -> Result<(), HostError> {
        info!("setting tab title (tab_id={}, title={})", self.tab_id, title);
        self.write_event(&TabEvent::Title {
            title: title.to_string(),
        })
    }

    fn conversation_title(&self) -> Option<String> {
        self.replay().ok().and_then(|(_, title)| title)
    }
}
