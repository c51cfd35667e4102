//! Wire types shared across the dbchat crates: messages, events, and
//! common identifiers.

mod tool;

pub use tool::ToolError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a chat session.
pub type SessionId = Uuid;
/// Unique identifier for a turn.
pub type TurnId = Uuid;
/// Model-issued identifier for a tool call.
pub type ToolCallId = String;

/// Speaker role for a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored message.
    User,
    /// Assistant-authored message, possibly carrying tool calls.
    Assistant,
    /// Tool result message, referencing the originating call.
    Tool,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A model-initiated request to execute a named tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Model-issued call id.
    pub id: ToolCallId,
    /// Registered tool name.
    pub name: String,
    /// Tool arguments as declared by the tool schema.
    pub arguments: Value,
}

/// Message stored in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role that produced the message.
    pub role: Role,
    /// Text content; tool results carry their payload JSON-encoded here.
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call id a tool result message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
    /// Timestamp for the message.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a plain user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build an assistant message with optional tool calls.
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build a tool result message answering the given call id.
    pub fn tool_result(call_id: impl Into<ToolCallId>, payload: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: payload.to_string(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            created_at: Utc::now(),
        }
    }
}

/// Tool metadata advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Tool description shown to the model.
    pub description: String,
    /// JSON schema for tool arguments.
    pub args_schema: Value,
}

/// Wrapper for events emitted during a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: Uuid,
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: EventPayload,
}

impl EventMsg {
    /// Build a new event for a session with a fresh id and timestamp.
    pub fn new(session_id: SessionId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

/// All events emitted during orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventPayload {
    /// Turn lifecycle started.
    TurnStarted { turn_id: TurnId },
    /// Streaming response delta from the assistant.
    AssistantDelta { turn_id: TurnId, delta: String },
    /// Tool call execution started.
    ToolCallStarted {
        turn_id: TurnId,
        call_id: ToolCallId,
        tool_name: String,
        arguments: Value,
    },
    /// Tool call execution completed.
    ToolCallFinished {
        turn_id: TurnId,
        call_id: ToolCallId,
        result: Value,
        success: bool,
    },
    /// A tool call is waiting for a human decision.
    PermissionRequested {
        turn_id: TurnId,
        call_id: ToolCallId,
        tool_name: String,
        arguments: Value,
    },
    /// A pending permission request was resolved.
    ApprovalResolved {
        turn_id: TurnId,
        call_id: ToolCallId,
        approved: bool,
    },
    /// Turn finished with a final assistant message.
    TurnCompleted { turn_id: TurnId, message: String },
    /// Turn was aborted by the caller.
    TurnAborted { turn_id: TurnId },
    /// Turn failed with a human-readable message.
    Error {
        turn_id: Option<TurnId>,
        message: String,
    },
    /// Local model install progress.
    ModelPull {
        model: String,
        status: String,
        completed: Option<u64>,
        total: Option<u64>,
    },
    /// Conversation title was generated or replaced.
    TitleChanged { title: String },
}

/// Sink for orchestration events.
pub trait EventSink: Send + Sync {
    /// Emit an event to the sink.
    fn emit(&self, event: EventMsg);
}
