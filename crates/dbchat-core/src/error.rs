//! Session error taxonomy and the human-readable classifier applied
//! before anything reaches the host surface.

use dbchat_protocol::ToolError;
use dbchat_providers::ProviderError;
use serde_json::Value;
use thiserror::Error;

use crate::gate::GateError;
use crate::host::HostError;

/// Errors surfaced by the chat session.
#[derive(Debug, Error)]
pub enum ChatError {
    /// `send` was called before a provider/model was selected.
    #[error("No provider or model selected.")]
    NoModelSelected,
    /// `send` was called while a turn is already in flight.
    #[error("A request is already in progress.")]
    Busy,
    /// Provider transport failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Tool lookup, validation, or execution failure.
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// Permission gate failure.
    #[error(transparent)]
    Gate(#[from] GateError),
    /// Host or persistence failure.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ChatError {
    /// Short name passed alongside notifications, mirroring the error
    /// class the host surface keys its display on.
    pub fn name(&self) -> &'static str {
        match self {
            ChatError::NoModelSelected => "NoModelSelectedError",
            ChatError::Busy => "BusyError",
            ChatError::Provider(_) => "ProviderError",
            ChatError::Tool(ToolError::NoSuchTool(_)) => "NoSuchToolError",
            ChatError::Tool(ToolError::InvalidArguments(_)) => "InvalidToolArgumentsError",
            ChatError::Tool(_) => "ToolExecutionError",
            ChatError::Gate(_) => "PermissionError",
            ChatError::Host(_) => "HostError",
        }
    }

    /// Convert to the single human-readable string shown to the user.
    /// No raw internal error crosses the host boundary.
    pub fn human_message(&self) -> String {
        match self {
            ChatError::NoModelSelected | ChatError::Busy => self.to_string(),
            ChatError::Provider(err) => provider_message(err),
            ChatError::Tool(ToolError::NoSuchTool(_)) => {
                "The model tried to call an unknown tool.".to_string()
            }
            ChatError::Tool(ToolError::InvalidArguments(_)) => {
                "The model called a tool with invalid arguments.".to_string()
            }
            ChatError::Tool(_) => "An error occurred during tool execution.".to_string(),
            ChatError::Gate(_) | ChatError::Host(_) => "An unknown error occurred.".to_string(),
        }
    }
}

/// Best-effort classification of transport errors. Heuristic, not a
/// contract: unclassifiable errors get the generic message.
fn provider_message(err: &ProviderError) -> String {
    match err {
        // Configuration errors surface verbatim.
        ProviderError::UnknownProvider(_)
        | ProviderError::UnknownModel { .. }
        | ProviderError::MissingCredentials(_) => err.to_string(),
        ProviderError::Api { status, message } => {
            if let Some(detail) = embedded_json_error(message) {
                return format!("Ollama API Error: {detail}");
            }
            if *status == 400 || message.contains("400 Bad Request") {
                return "The Ollama server returned a Bad Request error. The model might not \
                        support the requested operation."
                    .to_string();
            }
            "An unknown error occurred.".to_string()
        }
        ProviderError::Stream(message) => {
            if let Some(detail) = embedded_json_error(message) {
                format!("Ollama API Error: {detail}")
            } else {
                "An unknown error occurred.".to_string()
            }
        }
        ProviderError::Http(_) | ProviderError::Serde(_) => {
            "An unknown error occurred.".to_string()
        }
    }
}

/// Extract `error` from a JSON body embedded anywhere in the text.
fn embedded_json_error(text: &str) -> Option<String> {
    let start = text.find('{')?;
    if !text.contains("error") {
        return None;
    }
    let parsed: Value = serde_json::from_str(&text[start..]).ok()?;
    match parsed.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tool_errors_get_fixed_messages() {
        let unknown = ChatError::Tool(ToolError::NoSuchTool("drop_db".to_string()));
        assert_eq!(
            unknown.human_message(),
            "The model tried to call an unknown tool."
        );
        let invalid = ChatError::Tool(ToolError::InvalidArguments("bad".to_string()));
        assert_eq!(
            invalid.human_message(),
            "The model called a tool with invalid arguments."
        );
        let exec = ChatError::Tool(ToolError::Execution {
            call_id: "call_1".to_string(),
            message: "boom".to_string(),
        });
        assert_eq!(
            exec.human_message(),
            "An error occurred during tool execution."
        );
    }

    #[test]
    fn embedded_json_error_body_is_extracted() {
        let err = ChatError::Provider(ProviderError::Api {
            status: 500,
            message: "POST /api/chat failed: {\"error\":\"model not found\"}".to_string(),
        });
        assert_eq!(err.human_message(), "Ollama API Error: model not found");
    }

    #[test]
    fn bad_request_gets_specific_message() {
        let err = ChatError::Provider(ProviderError::Api {
            status: 400,
            message: "400 Bad Request".to_string(),
        });
        assert!(err.human_message().contains("Bad Request error"));
    }

    #[test]
    fn configuration_errors_surface_verbatim() {
        let err = ChatError::Provider(ProviderError::MissingCredentials(
            dbchat_config::ProviderKind::OpenAi,
        ));
        assert_eq!(
            err.human_message(),
            "missing credentials for provider: openai"
        );
    }

    #[test]
    fn unclassifiable_errors_get_generic_message() {
        let err = ChatError::Provider(ProviderError::Stream("connection reset".to_string()));
        assert_eq!(err.human_message(), "An unknown error occurred.");
    }
}
