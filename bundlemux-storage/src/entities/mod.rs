//! SeaORM entity definitions

pub mod bundle_credentials;
pub mod bundle_entries;
pub mod bundles;
pub mod mcp_servers;
pub mod tokens;
pub mod users;

pub use bundle_credentials::Entity as BundleCredentials;
pub use bundle_entries::Entity as BundleEntries;
pub use bundles::Entity as Bundles;
pub use mcp_servers::Entity as McpServers;
pub use tokens::Entity as Tokens;
pub use users::Entity as Users;
