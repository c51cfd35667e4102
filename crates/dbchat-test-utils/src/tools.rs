//! Dummy tools for gateway and session tests.

use async_trait::async_trait;
use dbchat_protocol::ToolError;
use dbchat_tools::Tool;
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Tool that records its invocations and echoes fixed rows.
pub struct RecordingTool {
    name: String,
    result: Value,
    invocations: Mutex<Vec<Value>>,
}

impl RecordingTool {
    /// A `run_query`-shaped tool returning the given result payload.
    pub fn run_query(result: Value) -> Self {
        Self {
            name: "run_query".to_string(),
            result,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn named(name: impl Into<String>, result: Value) -> Self {
        Self {
            name: name.into(),
            result,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Arguments received so far, in call order.
    pub fn invocations(&self) -> Vec<Value> {
        self.invocations.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.invocations.lock().len()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Run a SQL query against the current connection"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        self.invocations.lock().push(args);
        Ok(self.result.clone())
    }
}

/// Tool whose handler always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "run_query"
    }

    fn description(&self) -> &str {
        "Run a SQL query against the current connection"
    }

    fn args_schema(&self) -> Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        Err(ToolError::Execution {
            call_id: String::new(),
            message: "query failed".to_string(),
        })
    }
}
