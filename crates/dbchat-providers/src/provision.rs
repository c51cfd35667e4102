//! Local model provisioning: make sure a requested model is installed
//! before it is selected, pulling it at most once when it is not.

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ProviderError;

/// A model reported by the local server's tag listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InstalledModel {
    /// Model name, usually `base:tag`.
    pub name: String,
    /// On-disk size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// One progress line from a model pull.
#[derive(Debug, Clone, PartialEq)]
pub struct PullProgress {
    /// Server-reported status line.
    pub status: String,
    /// Layer digest being downloaded, when known.
    pub digest: Option<String>,
    /// Total bytes for the current layer.
    pub total: Option<u64>,
    /// Bytes downloaded so far for the current layer.
    pub completed: Option<u64>,
}

/// Stream of pull progress updates; ends when the pull completes.
pub type PullStream = ReceiverStream<Result<PullProgress, ProviderError>>;

/// Model-management surface of a local inference server.
#[async_trait]
pub trait LocalModelApi: Send + Sync {
    /// List installed models.
    async fn installed_models(&self) -> Result<Vec<InstalledModel>, ProviderError>;

    /// Start downloading a model, streaming progress.
    async fn pull_model(&self, name: &str) -> Result<PullStream, ProviderError>;
}

/// Provisioning lifecycle notifications, reported through a caller
/// callback so the session can relay them to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionEvent {
    /// The model is missing and a pull is starting.
    PullStarting,
    /// A progress update from the running pull.
    Progress(PullProgress),
    /// The pull finished and the model is installed.
    PullCompleted,
}

/// Outcome of [`ModelProvisioner::ensure_available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The model was already installed; no pull ran.
    AlreadyInstalled,
    /// The model was pulled.
    Pulled,
}

/// Ensures a model exists on a local server before use.
pub struct ModelProvisioner {
    api: Arc<dyn LocalModelApi>,
}

impl ModelProvisioner {
    pub fn new(api: Arc<dyn LocalModelApi>) -> Self {
        Self { api }
    }

    /// Ensure `model` is installed, pulling it when absent. A model
    /// counts as installed when an installed name starts with the
    /// requested name, case-insensitively, so `llama3.1` is satisfied
    /// by an installed `llama3.1:70b`.
    pub async fn ensure_available(
        &self,
        model: &str,
        on_event: &mut dyn FnMut(ProvisionEvent),
    ) -> Result<ProvisionOutcome, ProviderError> {
        let installed = self.api.installed_models().await?;
        if is_installed(&installed, model) {
            debug!("model already installed, skipping pull (model={model})");
            return Ok(ProvisionOutcome::AlreadyInstalled);
        }

        info!("pulling missing model (model={model})");
        on_event(ProvisionEvent::PullStarting);
        let mut progress = self.api.pull_model(model).await?;
        while let Some(part) = progress.next().await {
            match part {
                Ok(part) => on_event(ProvisionEvent::Progress(part)),
                Err(err) => {
                    warn!("model pull failed (model={model}, error={err})");
                    return Err(err);
                }
            }
        }
        info!("model pull completed (model={model})");
        on_event(ProvisionEvent::PullCompleted);
        Ok(ProvisionOutcome::Pulled)
    }
}

fn is_installed(installed: &[InstalledModel], model: &str) -> bool {
    let wanted = model.to_ascii_lowercase();
    installed
        .iter()
        .any(|entry| entry.name.to_ascii_lowercase().starts_with(&wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct StubApi {
        installed: Vec<InstalledModel>,
        pulls: Mutex<Vec<String>>,
        fail_pull: bool,
    }

    impl StubApi {
        fn new(names: &[&str]) -> Self {
            Self {
                installed: names
                    .iter()
                    .map(|name| InstalledModel {
                        name: name.to_string(),
                        size: 0,
                    })
                    .collect(),
                pulls: Mutex::new(Vec::new()),
                fail_pull: false,
            }
        }
    }

    #[async_trait]
    impl LocalModelApi for StubApi {
        async fn installed_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
            Ok(self.installed.clone())
        }

        async fn pull_model(&self, name: &str) -> Result<PullStream, ProviderError> {
            self.pulls.lock().push(name.to_string());
            if self.fail_pull {
                return Err(ProviderError::Api {
                    status: 500,
                    message: json!({"error": "pull failed"}).to_string(),
                });
            }
            let (tx, rx) = mpsc::channel(4);
            tx.try_send(Ok(PullProgress {
                status: "downloading".to_string(),
                digest: Some("sha256:abc".to_string()),
                total: Some(100),
                completed: Some(50),
            }))
            .ok();
            tx.try_send(Ok(PullProgress {
                status: "success".to_string(),
                digest: None,
                total: None,
                completed: None,
            }))
            .ok();
            Ok(ReceiverStream::new(rx))
        }
    }

    #[tokio::test]
    async fn installed_model_skips_pull() {
        let api = Arc::new(StubApi::new(&["llama3.1:8b"]));
        let provisioner = ModelProvisioner::new(api.clone());
        let outcome = provisioner
            .ensure_available("llama3.1", &mut |_| {})
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::AlreadyInstalled);
        assert!(api.pulls.lock().is_empty());
    }

    #[tokio::test]
    async fn base_name_match_is_case_insensitive() {
        let api = Arc::new(StubApi::new(&["Mistral:latest"]));
        let provisioner = ModelProvisioner::new(api.clone());
        let outcome = provisioner
            .ensure_available("mistral", &mut |_| {})
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::AlreadyInstalled);
    }

    #[tokio::test]
    async fn missing_model_pulls_once_with_lifecycle_events() {
        let api = Arc::new(StubApi::new(&["qwen2.5"]));
        let provisioner = ModelProvisioner::new(api.clone());
        let mut events = Vec::new();
        let outcome = provisioner
            .ensure_available("llama3.2", &mut |event| events.push(event))
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::Pulled);
        assert_eq!(api.pulls.lock().as_slice(), ["llama3.2".to_string()]);
        assert_eq!(events.first(), Some(&ProvisionEvent::PullStarting));
        assert_eq!(events.last(), Some(&ProvisionEvent::PullCompleted));
        assert!(events
            .iter()
            .any(|event| matches!(event, ProvisionEvent::Progress(_))));
    }

    #[tokio::test]
    async fn pull_failure_surfaces_error() {
        let mut api = StubApi::new(&[]);
        api.fail_pull = true;
        let provisioner = ModelProvisioner::new(Arc::new(api));
        let result = provisioner.ensure_available("llama3.2", &mut |_| {}).await;
        assert!(result.is_err());
    }

    #[test]
    fn installed_name_prefix_satisfies_request() {
        let installed = vec![InstalledModel {
            name: "llama3.1:70b".to_string(),
            size: 0,
        }];
        assert!(is_installed(&installed, "llama3.1"));
        assert!(is_installed(&installed, "llama3"));
        assert!(is_installed(&installed, "LLaMA3.1:70B"));
        assert!(!is_installed(&installed, "llama3.2"));
    }
}
