//! Per-MCP capability allow-lists
//!
//! A bundle entry carries one `McpPermissions` value. The lists are pattern
//! strings: a literal name, `*` for allow-all, or a regular expression. The
//! matching rules live in `bundlemux-core::permissions`; this type is only
//! the data shape, stored as JSON text on the bundle entry row.

use serde::{Deserialize, Serialize};

/// Allow-lists for the three namespaced capability kinds.
///
/// An empty list denies everything of that kind. The absence of the whole
/// object (an `Option<McpPermissions>` of `None`) means allow-all and is
/// reserved for internal contexts such as the wildcard resolver path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct McpPermissions {
    /// Patterns for tool names
    pub allowed_tools: Vec<String>,

    /// Patterns for resource URIs
    pub allowed_resources: Vec<String>,

    /// Patterns for prompt names
    pub allowed_prompts: Vec<String>,
}

impl McpPermissions {
    /// Permissions that admit every capability of every kind.
    pub fn allow_all() -> Self {
        Self {
            allowed_tools: vec!["*".to_string()],
            allowed_resources: vec!["*".to_string()],
            allowed_prompts: vec!["*".to_string()],
        }
    }

    /// Permissions that admit nothing.
    pub fn deny_all() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_deny_all() {
        let permissions = McpPermissions::default();
        assert!(permissions.allowed_tools.is_empty());
        assert!(permissions.allowed_resources.is_empty());
        assert!(permissions.allowed_prompts.is_empty());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: McpPermissions =
            serde_json::from_str(r#"{"allowed_tools":["search"]}"#).unwrap();
        assert_eq!(parsed.allowed_tools, vec!["search"]);
        assert!(parsed.allowed_resources.is_empty());
    }
}
