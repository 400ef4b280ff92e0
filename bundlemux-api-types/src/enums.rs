//! Enumerations shared across API boundaries

use serde::{Deserialize, Serialize};

/// Where an upstream MCP's credentials come from.
///
/// `Master` servers carry one encrypted auth blob used by every bundle that
/// references them. `UserSet` servers require a per-token credential bound
/// through the credential API before the entry resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Upstream requires no authentication
    #[default]
    None,

    /// A single shared credential, stored encrypted on the MCP record
    Master,

    /// Per-token credentials, stored encrypted per (token, mcp) pair
    UserSet,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategy::None => "none",
            AuthStrategy::Master => "master",
            AuthStrategy::UserSet => "user_set",
        }
    }
}

impl std::str::FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AuthStrategy::None),
            "master" => Ok(AuthStrategy::Master),
            "user_set" => Ok(AuthStrategy::UserSet),
            other => Err(format!("unknown auth strategy: {}", other)),
        }
    }
}

impl std::fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
