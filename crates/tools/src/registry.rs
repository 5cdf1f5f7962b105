//! Tool registry and executor (§4.E): named capabilities with JSON-Schema
//! parameters, executed with timing, error capture, and in-order batching.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ea_domain::error::{Error, Result};

/// A tool's runtime failure, captured rather than propagated.
///
/// `kind` stands in for the exception type the source language would
/// report (e.g. `ZeroDivisionError`); its `Display` form is
/// `"<kind>: <message>"`, matching `error_message` in `ToolExecutionFailed`.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub type ToolFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, ToolError>> + Send>>;
pub type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A registry entry: `{name, description, parameters_schema, function}`.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub function: ToolFn,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters_schema", &self.parameters_schema)
            .finish()
    }
}

impl Tool {
    /// Build a tool from a synchronous/async closure. `description` must be
    /// non-empty, matching §3.5.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Result<Self>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::Config("tool description must not be empty".into()));
        }
        Ok(Self {
            name: name.into(),
            description,
            parameters_schema,
            function: Arc::new(move |args| Box::pin(function(args))),
        })
    }
}

/// `{name, description, parameters_schema}` as presented to a model — no
/// function pointer, safe to serialize into a provider's tool-declaration
/// list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Maps tool names to entries. Names are unique within a registry.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails explicitly on a duplicate name.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.tools.contains_key(&tool.name) {
            return Err(Error::ToolAlreadyRegistered(tool.name));
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<Tool> {
        self.tools.remove(name)
    }

    /// Look up a tool by name. Fails with a message enumerating the
    /// available names when not found.
    pub fn get(&self, name: &str) -> Result<&Tool> {
        self.tools.get(name).ok_or_else(|| {
            let mut available: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
            available.sort();
            Error::ToolNotFound(format!(
                "{name} (available: {})",
                available.join(", ")
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The declarations to hand to a [`ea_providers::ChatRequest`] so the
    /// model knows what it may call.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let tool = &self.tools[name];
                ToolDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters_schema.clone(),
                }
            })
            .collect()
    }
}

/// One requested invocation: `{name, arguments}`.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// `Result{success, result, error_message?, execution_time_ms, tool_name}`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub tool_name: String,
}

/// Executes tool invocations against a [`ToolRegistry`]. A missing tool or
/// a failure raised inside the tool's function is captured inside the
/// returned [`ExecutionResult`] — it never propagates to the caller.
pub struct ToolExecutor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Execute a single invocation, capturing timing from just-before the
    /// call to just-after it returns, on success or failure alike.
    pub async fn execute(&self, name: &str, arguments: Value) -> ExecutionResult {
        let start = Instant::now();
        let tool = match self.registry.get(name) {
            Ok(tool) => tool.clone(),
            Err(e) => {
                return ExecutionResult {
                    success: false,
                    result: None,
                    error_message: Some(e.to_string()),
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    tool_name: name.to_string(),
                };
            }
        };

        let outcome = (tool.function)(arguments).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => ExecutionResult {
                success: true,
                result: Some(result),
                error_message: None,
                execution_time_ms,
                tool_name: name.to_string(),
            },
            Err(err) => ExecutionResult {
                success: false,
                result: None,
                error_message: Some(err.to_string()),
                execution_time_ms,
                tool_name: name.to_string(),
            },
        }
    }

    /// Run a batch of invocations in order, continuing past failures.
    /// Returns one result per call, in input order.
    pub async fn execute_batch(&self, calls: &[ToolInvocation]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(&call.name, call.arguments.clone()).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_tool() -> Tool {
        Tool::new(
            "add",
            "Add two integers",
            json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"],
            }),
            |args: Value| async move {
                let a = args.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
                let b = args.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(a + b))
            },
        )
        .unwrap()
    }

    fn divide_tool() -> Tool {
        Tool::new(
            "divide",
            "Divide a by b",
            json!({"type": "object"}),
            |args: Value| async move {
                let a = args.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
                let b = args.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
                if b == 0 {
                    return Err(ToolError::new("ZeroDivisionError", "Division by zero"));
                }
                Ok(json!(a / b))
            },
        )
        .unwrap()
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut registry = ToolRegistry::new();
        registry.register(add_tool()).unwrap();
        let err = registry.register(add_tool()).unwrap_err();
        assert!(matches!(err, Error::ToolAlreadyRegistered(_)));
    }

    #[test]
    fn register_rejects_empty_description() {
        let err = Tool::new("x", "", json!({}), |_: Value| async move { Ok(json!(null)) })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn get_missing_tool_lists_available_names() {
        let mut registry = ToolRegistry::new();
        registry.register(add_tool()).unwrap();
        let err = registry.get("subtract").unwrap_err();
        assert!(err.to_string().contains("add"));
    }

    #[tokio::test]
    async fn execute_success_reports_timing_and_result() {
        let mut registry = ToolRegistry::new();
        registry.register(add_tool()).unwrap();
        let executor = ToolExecutor::new(&registry);
        let result = executor.execute("add", json!({"a": 15, "b": 27})).await;
        assert!(result.success);
        assert_eq!(result.result, Some(json!(42)));
        assert_eq!(result.tool_name, "add");
    }

    #[tokio::test]
    async fn execute_missing_tool_is_captured_not_propagated() {
        let registry = ToolRegistry::new();
        let executor = ToolExecutor::new(&registry);
        let result = executor.execute("ghost", json!({})).await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn execute_tool_failure_formats_as_type_colon_message() {
        let mut registry = ToolRegistry::new();
        registry.register(divide_tool()).unwrap();
        let executor = ToolExecutor::new(&registry);
        let result = executor.execute("divide", json!({"a": 1, "b": 0})).await;
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("ZeroDivisionError: Division by zero")
        );
    }

    #[tokio::test]
    async fn execute_batch_continues_past_failure_and_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry.register(add_tool()).unwrap();
        registry.register(divide_tool()).unwrap();
        let executor = ToolExecutor::new(&registry);
        let calls = vec![
            ToolInvocation {
                name: "divide".into(),
                arguments: json!({"a": 1, "b": 0}),
            },
            ToolInvocation {
                name: "add".into(),
                arguments: json!({"a": 2, "b": 2}),
            },
        ];
        let results = executor.execute_batch(&calls).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert_eq!(results[1].result, Some(json!(4)));
    }
}
