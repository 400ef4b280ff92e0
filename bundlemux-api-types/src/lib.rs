//! Domain value types for the bundlemux gateway
//!
//! These types are shared by every layer: the storage repositories load and
//! persist them, the bundle resolver assembles them, and the management API
//! serializes them. They carry no behavior beyond validation helpers -
//! relations are navigated by id lookup through the repository ports, never
//! by object-graph traversal.

pub mod auth;
pub mod domain;
pub mod enums;
pub mod permissions;

pub use auth::AuthConfig;
pub use domain::{
    Bundle, BundleCredential, BundleEntry, BundleEntryRequest, CreateBundleRequest,
    CreateMcpServerRequest, CreateUserRequest, IssuedToken, McpServer, Token,
    UpdateBundleRequest, UpdateMcpServerRequest, User,
};
pub use enums::AuthStrategy;
pub use permissions::McpPermissions;
