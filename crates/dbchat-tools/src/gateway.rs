//! Gateway between the model's tool calls and registered tools. Every
//! invocation is validated and approved before a handler runs.

use async_trait::async_trait;
use dbchat_protocol::{ToolCall, ToolError};
use log::{debug, info};
use serde_json::{Value, json};

use crate::tool::ToolRegistry;
use crate::validate::validate_args;

/// Tool-result payload recorded when the user rejects a call. The
/// wording steers the model toward asking for direction instead of
/// retrying the same call.
pub const REJECTION_MESSAGE: &str = "No - Tell the AI what to do differently.";

/// Decides whether a proposed tool call may run. Implementations may
/// suspend indefinitely while a human decides.
#[async_trait]
pub trait ToolApprover: Send + Sync {
    /// Return `true` to approve, `false` to reject. Errors abandon the
    /// call entirely.
    async fn approve(&self, call: &ToolCall) -> Result<bool, ToolError>;
}

/// Result of a gated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The handler ran; its result payload.
    Completed(Value),
    /// The user rejected the call; the handler never ran. The payload
    /// is the synthetic tool result to feed back to the model.
    Rejected(Value),
}

/// Runs tool calls through lookup, validation, and approval.
pub struct ToolGateway<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolGateway<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Invoke one tool call. The handler runs only after the approver
    /// approves; rejection yields a structured outcome, not an error.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        approver: &dyn ToolApprover,
    ) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::NoSuchTool(call.name.clone()))?;
        validate_args(&tool.args_schema(), &call.arguments)?;

        debug!(
            "requesting approval (tool={}, call_id={})",
            call.name, call.id
        );
        if !approver.approve(call).await? {
            info!("tool call rejected (tool={}, call_id={})", call.name, call.id);
            return Ok(ToolOutcome::Rejected(json!({
                "type": "error",
                "message": REJECTION_MESSAGE,
            })));
        }

        debug!("running tool (tool={}, call_id={})", call.name, call.id);
        let result = tool
            .call(call.arguments.clone())
            .await
            .map_err(|err| match err {
                ToolError::Execution { .. } => err,
                other => ToolError::Execution {
                    call_id: call.id.clone(),
                    message: other.to_string(),
                },
            })?;
        Ok(ToolOutcome::Completed(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct CountingTool {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "run_query"
        }

        fn description(&self) -> &str {
            "runs a query"
        }

        fn args_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
            })
        }

        async fn call(&self, args: Value) -> Result<Value, ToolError> {
            *self.calls.lock() += 1;
            Ok(json!({"ran": args["query"]}))
        }
    }

    struct FixedApprover(bool);

    #[async_trait]
    impl ToolApprover for FixedApprover {
        async fn approve(&self, _call: &ToolCall) -> Result<bool, ToolError> {
            Ok(self.0)
        }
    }

    fn registry_with_tool() -> (ToolRegistry, Arc<CountingTool>) {
        let registry = ToolRegistry::new();
        let tool = Arc::new(CountingTool {
            calls: Mutex::new(0),
        });
        registry.register(tool.clone());
        (registry, tool)
    }

    fn query_call() -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: "run_query".to_string(),
            arguments: json!({"query": "select 1"}),
        }
    }

    #[tokio::test]
    async fn approved_call_runs_handler() {
        let (registry, tool) = registry_with_tool();
        let gateway = ToolGateway::new(&registry);
        let outcome = gateway
            .invoke(&query_call(), &FixedApprover(true))
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::Completed(json!({"ran": "select 1"})));
        assert_eq!(*tool.calls.lock(), 1);
    }

    #[tokio::test]
    async fn rejected_call_never_runs_handler() {
        let (registry, tool) = registry_with_tool();
        let gateway = ToolGateway::new(&registry);
        let outcome = gateway
            .invoke(&query_call(), &FixedApprover(false))
            .await
            .unwrap();
        match outcome {
            ToolOutcome::Rejected(payload) => {
                assert_eq!(payload["message"], REJECTION_MESSAGE);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(*tool.calls.lock(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_fails_before_approval() {
        let (registry, _) = registry_with_tool();
        let gateway = ToolGateway::new(&registry);
        let call = ToolCall {
            id: "call_2".to_string(),
            name: "drop_database".to_string(),
            arguments: json!({}),
        };
        let err = gateway
            .invoke(&call, &FixedApprover(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NoSuchTool(name) if name == "drop_database"));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_approval() {
        let (registry, tool) = registry_with_tool();
        let gateway = ToolGateway::new(&registry);
        let call = ToolCall {
            id: "call_3".to_string(),
            name: "run_query".to_string(),
            arguments: json!({"query": 5}),
        };
        let err = gateway
            .invoke(&call, &FixedApprover(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert_eq!(*tool.calls.lock(), 0);
    }
}
