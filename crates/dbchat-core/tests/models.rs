//! Model selection and local-model provisioning behavior.

use std::sync::Arc;

use dbchat_config::{ChatConfig, ProviderKind};
use dbchat_core::ChatSession;
use dbchat_protocol::{EventPayload, EventSink};
use dbchat_test_utils::{CollectingSink, MemoryTabStore, StubHost, StubLocalApi};
use dbchat_tools::ToolRegistry;
use pretty_assertions::assert_eq;

struct Fixture {
    session: ChatSession,
    api: Arc<StubLocalApi>,
    host: Arc<StubHost>,
    sink: Arc<CollectingSink>,
}

fn fixture(api: StubLocalApi) -> Fixture {
    let api = Arc::new(api);
    let host = Arc::new(StubHost::new());
    let sink = Arc::new(CollectingSink::new());
    let sink_dyn: Arc<dyn EventSink> = sink.clone();
    let session = ChatSession::new(
        ChatConfig::builder().build(),
        Arc::new(ToolRegistry::new()),
        host.clone(),
        Arc::new(MemoryTabStore::new()),
        Some(sink_dyn),
    )
    .with_local_api(api.clone());
    Fixture {
        session,
        api,
        host,
        sink,
    }
}

fn pull_statuses(sink: &CollectingSink) -> Vec<String> {
    sink.payloads()
        .into_iter()
        .filter_map(|p| match p {
            EventPayload::ModelPull { status, .. } => Some(status),
            _ => None,
        })
        .collect()
}

/// Remote providers never touch the local model API.
#[tokio::test]
async fn remote_selection_skips_provisioning() {
    let fx = fixture(StubLocalApi::new());
    fx.session
        .set_model(ProviderKind::Anthropic, "claude-sonnet-4-0")
        .await;
    assert_eq!(fx.api.pull_count(), 0);
    assert_eq!(
        fx.session.selected_model(),
        Some((ProviderKind::Anthropic, "claude-sonnet-4-0".to_string()))
    );
    assert!(!fx.session.is_provisioning());
}

/// An already-installed local model is selected without a pull.
#[tokio::test]
async fn installed_local_model_is_not_pulled() {
    let fx = fixture(StubLocalApi::new().with_installed(&["llama3.1:8b"]));
    fx.session.set_model(ProviderKind::Ollama, "llama3.1").await;
    assert_eq!(fx.api.pull_count(), 0);
    assert_eq!(
        fx.session.selected_model(),
        Some((ProviderKind::Ollama, "llama3.1".to_string()))
    );
    assert_eq!(fx.host.messages_on("pluginError"), Vec::<String>::new());
}

/// A missing local model is pulled once, with user-facing notices and
/// progress events around the download.
#[tokio::test]
async fn missing_local_model_is_pulled_with_notices() {
    let fx = fixture(StubLocalApi::new());
    fx.session.set_model(ProviderKind::Ollama, "mistral").await;

    assert_eq!(fx.api.pull_count(), 1);
    assert_eq!(
        fx.host.messages_on("pluginError"),
        [
            "Pulling model: mistral. This may take a few minutes for the first time.",
            "Successfully pulled model: mistral",
        ]
    );
    let statuses = pull_statuses(&fx.sink);
    assert_eq!(statuses.first().map(String::as_str), Some("starting"));
    assert_eq!(statuses.last().map(String::as_str), Some("completed"));
    assert!(!fx.session.is_provisioning());
}

/// A failed pull is reported but never blocks selection.
#[tokio::test]
async fn failed_pull_still_selects_model() {
    let fx = fixture(StubLocalApi::new().fail_pulls());
    fx.session.set_model(ProviderKind::Ollama, "mistral").await;

    assert_eq!(fx.api.pull_count(), 1);
    let notices = fx.host.messages_on("pluginError");
    assert!(
        notices
            .iter()
            .any(|notice| notice.starts_with("Error with Ollama model:")),
        "expected a pull-failure notice, got {notices:?}"
    );
    assert_eq!(
        fx.session.selected_model(),
        Some((ProviderKind::Ollama, "mistral".to_string()))
    );
    assert!(!fx.session.is_provisioning());
}
