//! Conversation title generation: runs once, truncates, and defers to
//! a title the tab already has.

use std::sync::Arc;

use dbchat_config::{ChatConfig, ProviderKind};
use dbchat_core::{ChatSession, TabStore};
use dbchat_protocol::{EventPayload, EventSink};
use dbchat_test_utils::{
    CollectingSink, MemoryTabStore, ScriptItem, ScriptedTransport, StubHost,
};
use dbchat_tools::ToolRegistry;
use pretty_assertions::assert_eq;

struct Fixture {
    session: Arc<ChatSession>,
    transport: Arc<ScriptedTransport>,
    tabs: Arc<MemoryTabStore>,
    sink: Arc<CollectingSink>,
}

fn fixture(tabs: MemoryTabStore) -> Fixture {
    let transport = Arc::new(ScriptedTransport::new());
    let tabs = Arc::new(tabs);
    let sink = Arc::new(CollectingSink::new());
    let sink_dyn: Arc<dyn EventSink> = sink.clone();
    let session = Arc::new(
        ChatSession::new(
            ChatConfig::builder().build(),
            Arc::new(ToolRegistry::new()),
            Arc::new(StubHost::new()),
            tabs.clone(),
            Some(sink_dyn),
        )
        .with_transport(ProviderKind::OpenAi, "gpt-4.1", transport.clone()),
    );
    Fixture {
        session,
        transport,
        tabs,
        sink,
    }
}

/// The first completed turn names the conversation; later turns leave
/// the name alone.
#[tokio::test]
async fn title_is_generated_exactly_once() {
    let fx = fixture(MemoryTabStore::new());
    fx.transport
        .push_round(vec![ScriptItem::Delta("Two users.".to_string())]);
    fx.transport
        .push_structured(serde_json::json!({"title": "User counts"}));

    fx.session.send("How many users?").await.expect("send");
    assert_eq!(fx.session.title().as_deref(), Some("User counts"));
    assert_eq!(fx.tabs.conversation_title().as_deref(), Some("User counts"));
    assert_eq!(fx.transport.structured_call_count(), 1);

    fx.transport
        .push_round(vec![ScriptItem::Delta("Still two.".to_string())]);
    fx.session.send("Are you sure?").await.expect("send");
    assert_eq!(fx.transport.structured_call_count(), 1);
    assert_eq!(fx.session.title().as_deref(), Some("User counts"));
}

/// Generated titles are cut to the configured length.
#[tokio::test]
async fn title_is_truncated() {
    let fx = fixture(MemoryTabStore::new());
    fx.transport
        .push_round(vec![ScriptItem::Delta("Done.".to_string())]);
    fx.transport.push_structured(serde_json::json!({
        "title": "A very long conversation title that keeps going",
    }));

    fx.session.send("Hello").await.expect("send");
    let title = fx.session.title().expect("title");
    assert_eq!(title.chars().count(), 30);
    assert_eq!(title, "A very long conversation title");
}

/// A title change is announced on the event stream.
#[tokio::test]
async fn title_change_is_emitted() {
    let fx = fixture(MemoryTabStore::new());
    fx.transport
        .push_round(vec![ScriptItem::Delta("Done.".to_string())]);
    fx.transport
        .push_structured(serde_json::json!({"title": "Orders digest"}));

    fx.session.send("Summarize orders").await.expect("send");
    let titles: Vec<String> = fx
        .sink
        .payloads()
        .into_iter()
        .filter_map(|p| match p {
            EventPayload::TitleChanged { title } => Some(title),
            _ => None,
        })
        .collect();
    assert_eq!(titles, ["Orders digest"]);
}

/// A tab that already carries a title never triggers generation.
#[tokio::test]
async fn preset_title_skips_generation() {
    let fx = fixture(MemoryTabStore::new().with_title("Kept title"));
    fx.transport
        .push_round(vec![ScriptItem::Delta("Done.".to_string())]);

    fx.session.send("Hello").await.expect("send");
    assert_eq!(fx.transport.structured_call_count(), 0);
    assert_eq!(fx.tabs.conversation_title().as_deref(), Some("Kept title"));
}
