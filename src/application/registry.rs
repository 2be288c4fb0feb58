use super::tools::{builtin_tools, LocalTool, ToolContext};
use crate::domain::tool::ToolDeclaration;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Static lookup table from tool name to executor, built once per session
/// from the caller's allow-list. Performs no I/O itself; executors do.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn LocalTool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Builds a registry holding only the allowed subset of the built-in
    /// set, preserving the built-in declaration order. Unknown names in the
    /// allow-list are skipped with a warning rather than failing the session.
    pub fn with_allowed(allowed: &[String]) -> Self {
        let mut tools = Vec::new();
        let mut index = HashMap::new();
        let mut known = Vec::new();

        for tool in builtin_tools() {
            let name = tool.declaration().name;
            known.push(name.clone());
            if allowed.iter().any(|entry| entry == &name) {
                index.insert(name, tools.len());
                tools.push(tool);
            }
        }

        for entry in allowed {
            if !known.contains(entry) {
                warn!(tool = entry.as_str(), "allow-list names an unknown tool");
            }
        }

        Self { tools, index }
    }

    /// Registry exposing the full built-in set.
    pub fn all() -> Self {
        let allowed: Vec<String> = builtin_tools()
            .iter()
            .map(|tool| tool.declaration().name)
            .collect();
        Self::with_allowed(&allowed)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|tool| tool.declaration()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Parses the raw argument payload and runs the executor. Failures of
    /// any kind come back as a result object with an `error` field; this
    /// method never fails past its boundary.
    pub async fn execute(&self, name: &str, arguments: &str, ctx: &ToolContext) -> Value {
        let Some(&position) = self.index.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return super::tools::error_value(format!("unknown tool: {name}"));
        };

        let args = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(reason) => return super::tools::error_value(reason),
        };

        debug!(tool = name, "executing local tool");
        self.tools[position].run(args, ctx).await
    }
}

fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(Value::Object(Default::default())),
        Ok(value) => Ok(value),
        Err(err) => Err(format!("invalid JSON arguments: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ToolContext {
        ToolContext::new(std::env::temp_dir())
    }

    #[test]
    fn allow_list_filters_declarations() {
        let registry =
            ToolRegistry::with_allowed(&["Read".to_string(), "Bash".to_string()]);
        let names: Vec<String> = registry
            .declarations()
            .into_iter()
            .map(|decl| decl.name)
            .collect();
        assert_eq!(names, vec!["Read", "Bash"]);
        assert!(registry.contains("Read"));
        assert!(!registry.contains("Write"));
    }

    #[test]
    fn unknown_allow_list_entries_are_skipped() {
        let registry =
            ToolRegistry::with_allowed(&["Read".to_string(), "Teleport".to_string()]);
        assert_eq!(registry.declarations().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result() {
        let registry = ToolRegistry::all();
        let result = registry.execute("Teleport", "{}", &context()).await;
        let error = result.get("error").and_then(Value::as_str).unwrap_or("");
        assert!(!error.is_empty());
    }

    #[tokio::test]
    async fn malformed_arguments_yield_error_result() {
        let registry = ToolRegistry::all();
        let result = registry.execute("Read", "{not json", &context()).await;
        let error = result.get("error").and_then(Value::as_str).unwrap_or("");
        assert!(error.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn missing_required_argument_yields_error_result() {
        let registry = ToolRegistry::all();
        let result = registry.execute("Read", "{}", &context()).await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn empty_arguments_become_empty_object() {
        let registry = ToolRegistry::all();
        // Still an error (missing file_path) but parsing must succeed.
        let result = registry.execute("Read", "", &context()).await;
        let error = result.get("error").and_then(Value::as_str).unwrap_or("");
        assert!(error.contains("missing required parameter"));
    }
}
