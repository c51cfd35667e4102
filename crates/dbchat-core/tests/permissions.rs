//! Approval-gating behavior: ordering, rejection, and the automatic
//! follow-up replay.

use std::sync::Arc;
use std::time::Duration;

use dbchat_config::{ChatConfig, ProviderKind};
use dbchat_core::{ChatSession, SessionStatus};
use dbchat_protocol::{Role, ToolCall};
use dbchat_test_utils::{MemoryTabStore, RecordingTool, ScriptItem, ScriptedTransport, StubHost};
use dbchat_tools::{REJECTION_MESSAGE, ToolRegistry};
use pretty_assertions::assert_eq;
use serde_json::json;

struct Fixture {
    session: Arc<ChatSession>,
    transport: Arc<ScriptedTransport>,
    tool: Arc<RecordingTool>,
    host: Arc<StubHost>,
}

fn fixture() -> Fixture {
    let transport = Arc::new(ScriptedTransport::new());
    let tools = Arc::new(ToolRegistry::new());
    let tool = Arc::new(RecordingTool::run_query(json!({"rows": []})));
    tools.register(tool.clone());
    let host = Arc::new(StubHost::new());
    let tabs = Arc::new(MemoryTabStore::new().with_title("Preset"));
    let session = Arc::new(
        ChatSession::new(
            ChatConfig::builder().build(),
            tools,
            host.clone(),
            tabs,
            None,
        )
        .with_transport(ProviderKind::OpenAi, "gpt-4.1", transport.clone()),
    );
    Fixture {
        session,
        transport,
        tool,
        host,
    }
}

fn query_call(id: &str, query: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "run_query".to_string(),
        arguments: json!({"query": query}),
    }
}

/// The handler does not run before the decision arrives, and the
/// session reports the suspended call while waiting.
#[tokio::test]
async fn handler_runs_only_after_approval() {
    let fx = fixture();
    fx.transport.push_round(vec![ScriptItem::ToolCall(query_call(
        "call_1",
        "select 1",
    ))]);
    fx.transport
        .push_round(vec![ScriptItem::Delta("Done.".to_string())]);

    let decider = {
        let session = fx.session.clone();
        let tool = fx.tool.clone();
        tokio::spawn(async move {
            while session.pending_permission().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            // Still suspended: nothing has executed yet.
            assert_eq!(tool.call_count(), 0);
            assert_eq!(session.status(), SessionStatus::AwaitingPermission);
            let pending = session.pending_permission().expect("pending");
            assert_eq!(pending.tool_name, "run_query");
            assert_eq!(pending.call_id, "call_1");
            session.accept_permission();
        })
    };

    fx.session.send("Count the users").await.expect("send");
    decider.await.expect("decider");
    assert_eq!(fx.tool.call_count(), 1);
    assert_eq!(fx.session.status(), SessionStatus::Idle);
}

/// Rejection without a follow-up records the synthetic tool result and
/// ends the turn without another model round.
#[tokio::test]
async fn rejection_without_followup_ends_turn() {
    let fx = fixture();
    fx.transport.push_round(vec![
        ScriptItem::Delta("Running a query.".to_string()),
        ScriptItem::ToolCall(query_call("call_1", "delete from users")),
    ]);

    let decider = {
        let session = fx.session.clone();
        tokio::spawn(async move {
            while session.pending_permission().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            session.reject_permission(None);
        })
    };

    fx.session.send("Clean the table").await.expect("send");
    decider.await.expect("decider");

    assert_eq!(fx.tool.call_count(), 0);
    assert_eq!(fx.transport.request_count(), 1);

    let messages = fx.session.messages();
    let last = messages.last().expect("messages");
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
    assert!(last.content.contains(REJECTION_MESSAGE));

    assert_eq!(
        fx.host.messages_on("pluginError"),
        ["User rejected tool call. (toolCallId: call_1)"]
    );
    assert_eq!(fx.session.status(), SessionStatus::Idle);
}

/// Rejection with a follow-up appends the follow-up as a user message
/// and automatically replays a fresh turn over the updated history.
#[tokio::test]
async fn rejection_with_followup_replays_turn() {
    let fx = fixture();
    fx.transport.push_round(vec![
        ScriptItem::Delta("Querying users.".to_string()),
        ScriptItem::ToolCall(query_call("call_1", "select * from users")),
    ]);
    fx.transport.push_round(vec![ScriptItem::Delta(
        "Okay, looking at orders instead.".to_string(),
    )]);

    let decider = {
        let session = fx.session.clone();
        tokio::spawn(async move {
            while session.pending_permission().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            session.reject_permission(Some("use the orders table".to_string()));
        })
    };

    fx.session.send("Show me the data").await.expect("send");
    decider.await.expect("decider");

    let messages = fx.session.messages();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::Tool, Role::User, Role::Assistant]
    );
    assert_eq!(messages[3].content, "use the orders table");
    assert_eq!(messages[4].content, "Okay, looking at orders instead.");

    assert_eq!(fx.tool.call_count(), 0);
    assert_eq!(fx.transport.request_count(), 2);
    assert_eq!(fx.session.status(), SessionStatus::Idle);
}

/// Decisions arriving when nothing is pending are no-ops.
#[tokio::test]
async fn decisions_while_idle_are_noops() {
    let fx = fixture();
    assert!(!fx.session.accept_permission());
    assert!(!fx.session.reject_permission(Some("too late".to_string())));
    assert_eq!(fx.session.pending_permission(), None);
}
