//! SeaORM (SQLite) persistence layer for bundlemux
//!
//! Implements the `bundlemux-interfaces` repository ports. This crate is
//! the only place where credential material is translated between its
//! cleartext and encrypted forms: writes run through the vault before any
//! row is touched, reads decrypt (or apply the configured failure policy)
//! before a value crosses the port boundary.

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repositories;

pub use connection::DatabaseConnection;
pub use migrations::Migrator;
pub use repositories::SeaOrmRepositoryFactory;
