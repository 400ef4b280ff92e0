//! Allow-list matching
//!
//! Every aggregated catalog entry and every inbound operation is checked
//! against the owning bundle entry's allow-lists. Matching is pure: the
//! filter holds no state and never mutates the configuration it is given.
//!
//! Pattern semantics per list:
//! - empty list: deny everything of that kind
//! - a `*` member: allow everything of that kind
//! - otherwise a name is allowed iff some pattern equals it exactly or,
//!   when the pattern compiles as a regular expression, fully matches it.
//!   Patterns that fail to compile never match.

use bundlemux_api_types::McpPermissions;
use regex::Regex;

/// The three capability kinds the filter distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

/// Stateless allow-list filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionFilter;

impl PermissionFilter {
    pub fn new() -> Self {
        Self
    }

    /// Whether `name` passes the tool allow-list. A missing permissions
    /// object (internal contexts) allows everything.
    pub fn is_tool_allowed(&self, permissions: Option<&McpPermissions>, name: &str) -> bool {
        self.is_allowed(permissions, CapabilityKind::Tool, name)
    }

    /// Whether `uri` passes the resource allow-list.
    pub fn is_resource_allowed(&self, permissions: Option<&McpPermissions>, uri: &str) -> bool {
        self.is_allowed(permissions, CapabilityKind::Resource, uri)
    }

    /// Whether `name` passes the prompt allow-list.
    pub fn is_prompt_allowed(&self, permissions: Option<&McpPermissions>, name: &str) -> bool {
        self.is_allowed(permissions, CapabilityKind::Prompt, name)
    }

    pub fn is_allowed(
        &self,
        permissions: Option<&McpPermissions>,
        kind: CapabilityKind,
        name: &str,
    ) -> bool {
        let Some(permissions) = permissions else {
            return true;
        };
        let patterns = match kind {
            CapabilityKind::Tool => &permissions.allowed_tools,
            CapabilityKind::Resource => &permissions.allowed_resources,
            CapabilityKind::Prompt => &permissions.allowed_prompts,
        };
        matches_any(patterns, name)
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    if patterns.is_empty() {
        return false;
    }
    patterns.iter().any(|pattern| matches_pattern(pattern, name))
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern == name {
        return true;
    }
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(regex) => regex.is_match(name),
        Err(_) => {
            tracing::debug!(pattern = %pattern, "skipping uncompilable permission pattern");
            false
        }
    }
}

/// Whether a pattern would participate in matching: literal, `*`, or a
/// compilable regex. Used by the management API to reject dead patterns at
/// bundle-save time instead of silently skipping them forever.
pub fn is_valid_pattern(pattern: &str) -> bool {
    pattern == "*" || Regex::new(&format!("^(?:{})$", pattern)).is_ok()
}
