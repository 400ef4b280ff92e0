//! # Bundlemux MCP core
//!
//! The multiplexing heart of the gateway: a client presents one bearer
//! token and sees the union of several upstream MCP servers as a single
//! virtual server.
//!
//! ```text
//! ┌────────────┐   token   ┌──────────────┐   repositories   ┌─────────┐
//! │ MCP client ├──────────►│ BundleResolver├─────────────────►│ storage │
//! └─────┬──────┘           └──────┬───────┘                  └─────────┘
//!       │ operations              │ resolved upstreams
//! ┌─────▼──────┐  routes   ┌──────▼───────┐  shares stateless ┌────────┐
//! │  Session   ├──────────►│  Filtered    ├──────────────────►│  Pool  │
//! │            │           │  Connectors  │                   └────────┘
//! └────────────┘           └──────┬───────┘
//!                                 │ JSON-RPC over streamable HTTP
//!                          ┌──────▼───────┐
//!                          │  upstreams   │
//!                          └──────────────┘
//! ```

pub mod connector;
pub mod error;
pub mod protocol;
pub mod resolver;
pub mod session;

pub use connector::{
    ConnectionState, ConnectorEvent, ConnectorEventKind, ConnectorPool, FilteredConnector,
    HttpConnector, HttpConnectorFactory, UpstreamConnector,
};
pub use error::{GatewayError, GatewayResult};
pub use resolver::{BundleDescriptor, BundleResolver, ResolvedUpstream};
pub use session::{
    ConnectorFactory, Session, SessionConfig, SessionShutdown, SessionState, ShutdownReason,
};
