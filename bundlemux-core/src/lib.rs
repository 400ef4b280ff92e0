//! Core algorithms of the bundlemux gateway
//!
//! The three leaf components everything else composes:
//!
//! - [`vault`] - authenticated encryption of upstream auth material and
//!   opaque token issuance
//! - [`namespace`] - collision-free, reversible renaming of upstream
//!   capabilities
//! - [`permissions`] - allow-list matching for aggregated catalogs and
//!   inbound operations
//!
//! All three are pure with respect to I/O: no database, no network, no
//! clocks beyond what callers pass in.

pub mod namespace;
pub mod permissions;
pub mod token;
pub mod vault;

pub use namespace::{validate_namespace, HashMode, NamespaceError, NamespaceResolver, RenamedName};
pub use permissions::{is_valid_pattern, CapabilityKind, PermissionFilter};
pub use token::{
    hash_token, is_admin_key_format, is_token_format, mint_admin_key, mint_token, sha256_hex,
};
pub use vault::{looks_encrypted, CredentialVault, VaultError, VaultResult};
