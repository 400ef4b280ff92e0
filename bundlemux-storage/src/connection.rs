//! Database connection handling

use bundlemux_config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection as SeaConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, info};

use bundlemux_interfaces::DatabaseError;

/// Database connection wrapper with configuration
#[derive(Clone)]
pub struct DatabaseConnection {
    connection: SeaConnection,
}

impl DatabaseConnection {
    /// Open a connection per the database config.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        info!("Connecting to database: {}", config.url);

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(1)
            .connect_timeout(config.connection_timeout)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(false);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| DatabaseError::Connection {
                message: e.to_string(),
            })?;

        debug!(
            "Database connection established with {} max connections",
            config.max_connections
        );

        Ok(Self { connection })
    }

    /// An in-memory SQLite database, mainly for tests.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let connection = Database::connect("sqlite::memory:")
            .await
            .map_err(|e| DatabaseError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self { connection })
    }

    /// Apply all pending migrations.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        crate::migrations::Migrator::up(&self.connection, None)
            .await
            .map_err(|e| DatabaseError::Internal {
                message: format!("migration failed: {}", e),
            })
    }

    pub fn get_connection(&self) -> &SeaConnection {
        &self.connection
    }
}
