use crate::ToolCallId;

/// Errors returned by tool lookup, validation, and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The model referenced a tool name that is not registered.
    #[error("tool not found: {0}")]
    NoSuchTool(String),
    /// Tool arguments failed schema validation.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Handler threw during execution.
    #[error("tool execution failed (call_id={call_id}): {message}")]
    Execution {
        call_id: ToolCallId,
        message: String,
    },
    /// The approval wait was cancelled before a decision arrived.
    #[error("approval cancelled (call_id={0})")]
    ApprovalCancelled(ToolCallId),
}
