//! Stub local model API for provisioning tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dbchat_providers::{InstalledModel, LocalModelApi, ProviderError, PullProgress, PullStream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Scriptable [`LocalModelApi`] counting pulls.
#[derive(Default)]
pub struct StubLocalApi {
    installed: Mutex<Vec<InstalledModel>>,
    pulls: AtomicUsize,
    fail_pull: AtomicBool,
}

impl StubLocalApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(self, names: &[&str]) -> Self {
        *self.installed.lock() = names
            .iter()
            .map(|name| InstalledModel {
                name: name.to_string(),
                size: 0,
            })
            .collect();
        self
    }

    /// Make every pull fail after starting.
    pub fn fail_pulls(self) -> Self {
        self.fail_pull.store(true, Ordering::SeqCst);
        self
    }

    /// Number of pulls attempted.
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalModelApi for StubLocalApi {
    async fn installed_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
        Ok(self.installed.lock().clone())
    }

    async fn pull_model(&self, name: &str) -> Result<PullStream, ProviderError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(4);
        let fail = self.fail_pull.load(Ordering::SeqCst);
        let name = name.to_string();
        tokio::spawn(async move {
            let _ = tx
                .send(Ok(PullProgress {
                    status: format!("pulling {name}"),
                    digest: Some("sha256:stub".to_string()),
                    total: Some(100),
                    completed: Some(25),
                }))
                .await;
            if fail {
                let _ = tx
                    .send(Err(ProviderError::Stream("pull interrupted".to_string())))
                    .await;
                return;
            }
            let _ = tx
                .send(Ok(PullProgress {
                    status: "success".to_string(),
                    digest: None,
                    total: None,
                    completed: None,
                }))
                .await;
        });
        Ok(ReceiverStream::new(rx))
    }
}
