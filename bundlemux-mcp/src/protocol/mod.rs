//! MCP protocol types
//!
//! JSON-RPC 2.0 framing plus the MCP message schemas the gateway consumes
//! and produces. Only the subset the gateway multiplexes is modeled: the
//! initialize handshake, the three catalog families and their targeted
//! operations, and the list-changed notifications.

pub mod jsonrpc;
pub mod messages;

pub use jsonrpc::{JsonRpcError, JsonRpcErrorCode, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use messages::{
    ClientCapabilities, ClientInfo, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, Prompt, PromptArgument, PromptMessage, PromptsCapability, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContent, ResourceTemplate, ResourcesCapability,
    ServerCapabilities, ServerInfo, Tool, ToolCallParams, ToolCallResult, ToolContent,
    ToolsCapability, NOTIFICATION_PROMPTS_CHANGED, NOTIFICATION_RESOURCES_CHANGED,
    NOTIFICATION_TOOLS_CHANGED,
};

/// MCP protocol revision the gateway speaks on both sides.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
