//! Repository ports for the bundlemux gateway
//!
//! These traits are the only thing the gateway core knows about
//! persistence. The storage engine behind them is swappable; the SQLite
//! implementation lives in `bundlemux-storage`, and the resolver, session
//! and management layers depend solely on this crate.

pub mod database;

pub use database::{
    BundleRepository, CredentialRepository, CrudRepository, DatabaseError, McpServerRepository,
    Repository, RepositoryFactory, TokenRepository, UserRepository,
};
