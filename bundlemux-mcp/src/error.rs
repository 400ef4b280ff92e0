//! Error types for gateway operations

use thiserror::Error;

use crate::protocol::JsonRpcError;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Closed error set exposed to callers of the gateway core.
///
/// The first block mirrors the ingress status table; the second block are
/// transport-level kinds that surface as MCP errors or get sanitized into
/// `Internal` at the boundary.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing, malformed, unknown, revoked or expired bundle token
    #[error("Unauthorized: {reason}")]
    UnauthorizedToken { reason: String },

    /// Authorization predicate failed
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// No such bundle/MCP/credential
    #[error("Not found: {entity} {id}")]
    NotFound { entity: String, id: String },

    /// Uniqueness violation (namespace, bundle-token pair)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Client named a capability no filtered connector owns
    #[error("Unknown capability: {name}")]
    UnknownCapability { name: String },

    /// Name passed reverse lookup but the allow-list rejects it
    #[error("Permission denied for {name}")]
    PermissionDenied { name: String },

    /// Upstream connector is not in the connected state
    #[error("Upstream '{namespace}' is not connected")]
    NotConnected { namespace: String },

    /// Ciphertext failed its integrity check
    #[error("Credential decryption failed for {entity} {id}")]
    DecryptError { entity: String, id: String },

    /// Input failed schema validation
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Session has reached its terminal state
    #[error("Session is closed")]
    SessionClosed,

    /// Upstream connect attempt failed or timed out
    #[error("Connection to '{namespace}' failed: {reason}")]
    ConnectionFailed { namespace: String, reason: String },

    /// Attaching an upstream to a session failed; the session continues
    #[error("Failed to attach upstream '{namespace}': {reason}")]
    AttachFailed { namespace: String, reason: String },

    /// Transport-level failure talking to an upstream
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The upstream answered with a JSON-RPC error
    #[error("Upstream error {code}: {message}")]
    Upstream { code: i32, message: String },

    /// Serialization/deserialization failure
    #[error("Serialization error: {details}")]
    Serialization { details: String },

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Anything else; sanitized at the boundary
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::UnauthorizedToken {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn unknown_capability(name: impl Into<String>) -> Self {
        Self::UnknownCapability { name: name.into() }
    }

    pub fn permission_denied(name: impl Into<String>) -> Self {
        Self::PermissionDenied { name: name.into() }
    }

    pub fn not_connected(namespace: impl Into<String>) -> Self {
        Self::NotConnected {
            namespace: namespace.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn connection_failed(namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status this error maps to at the REST/ingress boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::UnauthorizedToken { .. } => 401,
            GatewayError::Forbidden { .. } => 403,
            GatewayError::NotFound { .. } => 404,
            GatewayError::Conflict { .. } => 409,
            GatewayError::Validation { .. } => 400,
            GatewayError::SessionClosed => 404,
            GatewayError::DecryptError { .. } => 500,
            _ => 500,
        }
    }

    /// JSON-RPC error object this error maps to inside an MCP response.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            GatewayError::UnknownCapability { name } => JsonRpcError::method_not_found(name),
            GatewayError::PermissionDenied { .. }
            | GatewayError::NotConnected { .. }
            | GatewayError::SessionClosed => {
                JsonRpcError::server_error(-32000, self.to_string(), None)
            }
            GatewayError::Validation { .. } => JsonRpcError::invalid_params(self.to_string()),
            GatewayError::Cancelled => {
                JsonRpcError::server_error(-32800, "Request cancelled", None)
            }
            GatewayError::Upstream { code, message } => {
                JsonRpcError::server_error(*code, message.clone(), None)
            }
            // Everything else is sanitized: kind only, no internals
            other => JsonRpcError::internal_error(other.kind_name()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            GatewayError::UnauthorizedToken { .. } => "unauthorized",
            GatewayError::Forbidden { .. } => "forbidden",
            GatewayError::NotFound { .. } => "not found",
            GatewayError::Conflict { .. } => "conflict",
            GatewayError::UnknownCapability { .. } => "unknown capability",
            GatewayError::PermissionDenied { .. } => "permission denied",
            GatewayError::NotConnected { .. } => "not connected",
            GatewayError::DecryptError { .. } => "decryption failed",
            GatewayError::Validation { .. } => "validation failed",
            GatewayError::SessionClosed => "session closed",
            GatewayError::ConnectionFailed { .. } => "connection failed",
            GatewayError::AttachFailed { .. } => "attach failed",
            GatewayError::Transport { .. } => "transport failure",
            GatewayError::Upstream { .. } => "upstream error",
            GatewayError::Serialization { .. } => "serialization failure",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Internal { .. } => "internal error",
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization {
            details: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Transport {
                message: format!("request timed out: {}", err),
            }
        } else if err.is_connect() {
            GatewayError::Transport {
                message: format!("connect failed: {}", err),
            }
        } else {
            GatewayError::Transport {
                message: err.to_string(),
            }
        }
    }
}

impl From<bundlemux_core::VaultError> for GatewayError {
    fn from(err: bundlemux_core::VaultError) -> Self {
        match err {
            bundlemux_core::VaultError::DecryptFailed
            | bundlemux_core::VaultError::MalformedCiphertext => GatewayError::DecryptError {
                entity: "credential".to_string(),
                id: "unknown".to_string(),
            },
            other => GatewayError::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<bundlemux_interfaces::DatabaseError> for GatewayError {
    fn from(err: bundlemux_interfaces::DatabaseError) -> Self {
        use bundlemux_interfaces::DatabaseError;
        match err {
            DatabaseError::NotFound { entity, id } => GatewayError::NotFound { entity, id },
            DatabaseError::Constraint { message } => GatewayError::Conflict { message },
            DatabaseError::Validation { message } => GatewayError::Validation {
                field: "input".to_string(),
                message,
            },
            DatabaseError::Decrypt { entity, id } => GatewayError::DecryptError { entity, id },
            other => GatewayError::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::unauthorized("expired").http_status(), 401);
        assert_eq!(GatewayError::forbidden("not creator").http_status(), 403);
        assert_eq!(GatewayError::not_found("bundle", 7).http_status(), 404);
        assert_eq!(GatewayError::conflict("dup").http_status(), 409);
        assert_eq!(GatewayError::validation("namespace", "bad").http_status(), 400);
        assert_eq!(GatewayError::internal("boom").http_status(), 500);
    }

    #[test]
    fn test_unknown_capability_maps_to_method_not_found() {
        let error = GatewayError::unknown_capability("notion__search");
        assert_eq!(error.to_jsonrpc_error().code, -32601);
    }

    #[test]
    fn test_internal_error_is_sanitized() {
        let error = GatewayError::internal("connection string user:pass@host");
        let rpc = error.to_jsonrpc_error();
        assert!(!format!("{:?}", rpc).contains("user:pass"));
    }
}
