//! The tool trait and registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dbchat_protocol::{ToolError, ToolSpec};
use log::debug;
use parking_lot::RwLock;
use serde_json::Value;

/// A host capability the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registered name, as advertised to the model.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema the arguments must satisfy.
    fn args_schema(&self) -> Value;

    /// Execute with validated arguments.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Name-keyed collection of registered tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!("registering tool (name={name})");
        self.tools.write().insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Specs for every registered tool, in name order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .read()
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                args_schema: tool.args_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct NoopTool(&'static str);

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        fn args_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn call(&self, _args: Value) -> Result<Value, ToolError> {
            Ok(json!(null))
        }
    }

    #[test]
    fn specs_are_listed_in_name_order() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(NoopTool("run_query")));
        registry.register(Arc::new(NoopTool("get_tables")));
        let names: Vec<_> = registry
            .specs()
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(names, ["get_tables", "run_query"]);
    }

    #[test]
    fn register_replaces_existing_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(NoopTool("run_query")));
        registry.register(Arc::new(NoopTool("run_query")));
        assert_eq!(registry.specs().len(), 1);
    }
}
