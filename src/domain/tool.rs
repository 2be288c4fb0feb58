use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix carried by every remote tool name. The full shape is
/// `mcp__{server}__{tool}`, which keeps remote names from colliding with
/// local tools or with each other and makes the name self-routing.
pub const REMOTE_PREFIX: &str = "mcp__";

const SEPARATOR: &str = "__";

/// A capability declaration published to the model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON-Schema-like object describing the tool's parameters.
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// True when the name carries the remote namespace prefix.
    pub fn is_remote(name: &str) -> bool {
        name.starts_with(REMOTE_PREFIX)
    }
}

/// Builds the namespaced declaration name for a tool on a server.
pub fn qualify(server: &str, tool: &str) -> String {
    format!("{REMOTE_PREFIX}{server}{SEPARATOR}{tool}")
}

/// Splits a namespaced name into server and tool.
///
/// Only the prefix and the first separator after it are structural; a tool
/// name may itself contain `__`, so everything past the server segment is
/// rejoined unchanged.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(REMOTE_PREFIX)?;
    let (server, tool) = rest.split_once(SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_and_split_round_trip() {
        let name = qualify("ctx7", "get-library-docs");
        assert_eq!(name, "mcp__ctx7__get-library-docs");
        assert_eq!(split_qualified(&name), Some(("ctx7", "get-library-docs")));
    }

    #[test]
    fn split_keeps_separator_inside_tool_name() {
        assert_eq!(
            split_qualified("mcp__graphiti__search__nodes"),
            Some(("graphiti", "search__nodes"))
        );
    }

    #[test]
    fn split_rejects_malformed_names() {
        assert_eq!(split_qualified("Read"), None);
        assert_eq!(split_qualified("mcp__only-server"), None);
        assert_eq!(split_qualified("mcp____tool"), None);
        assert_eq!(split_qualified("mcp__server__"), None);
    }
}
