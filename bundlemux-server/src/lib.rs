//! Axum ingress and management API for the bundlemux gateway
//!
//! Three route families share one [`state::AppState`]:
//!
//! - `/mcp` - the MCP client ingress (session creation, operation
//!   dispatch, server-initiated event stream, session teardown)
//! - `/api/v1/...` - the management API (users, MCP servers, bundles,
//!   tokens), guarded by `mcpa_` admin keys and the creator hierarchy
//! - `/api/v1/credentials` - per-token credential binding for user-set
//!   upstreams, guarded by `X-Bundle-Token`

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod sessions;
pub mod startup;
pub mod state;

pub use error::ApiError;
pub use sessions::SessionManager;
pub use startup::{build_router, build_state, run};
pub use state::AppState;
