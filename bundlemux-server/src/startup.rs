//! Server wiring and lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use bundlemux_config::BundlemuxConfig;
use bundlemux_core::{CredentialVault, HashMode, NamespaceResolver};
use bundlemux_mcp::{BundleResolver, ConnectorPool, HttpConnectorFactory};
use bundlemux_storage::{DatabaseConnection, SeaOrmRepositoryFactory};

use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::routes;
use crate::sessions::SessionManager;
use crate::state::AppState;

/// Initialize the tracing subscriber from the logging config.
pub fn init_tracing(config: &BundlemuxConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn hash_mode(config: &BundlemuxConfig) -> HashMode {
    match config.gateway.hash_mode.as_str() {
        "never" => HashMode::Never,
        "always" => HashMode::Always,
        _ => HashMode::Threshold,
    }
}

/// Build the shared state: vault, database, repositories, resolver,
/// session registry.
pub async fn build_state(config: BundlemuxConfig) -> anyhow::Result<AppState> {
    let vault = CredentialVault::from_env(config.security.production)
        .context("encryption key validation failed")?;

    let db = DatabaseConnection::new(&config.database)
        .await
        .context("database connection failed")?;
    if config.database.migrate_on_startup {
        db.migrate().await.context("database migration failed")?;
    }

    let repositories = Arc::new(SeaOrmRepositoryFactory::new(
        db,
        vault,
        config.security.decrypt_failure_policy(),
    ));

    let resolver = Arc::new(BundleResolver::new(
        repositories.clone(),
        config.resolver.clone(),
    ));

    let namespaces = Arc::new(NamespaceResolver::new(
        hash_mode(&config),
        config.gateway.name_threshold,
    ));

    let connector_factory = Arc::new(HttpConnectorFactory::new(
        config.gateway.connect_timeout,
        config.gateway.request_timeout,
    ));

    let sessions = Arc::new(SessionManager::new(config.server.max_sessions));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
        config.server.rate_limit_per_minute,
    )));

    Ok(AppState {
        config: Arc::new(config),
        repositories,
        resolver,
        sessions,
        pool: Arc::new(ConnectorPool::new()),
        namespaces,
        connector_factory,
        rate_limiter,
    })
}

/// Assemble the full route tree.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // MCP client ingress
        .route(
            "/mcp",
            post(routes::mcp::post_mcp)
                .get(routes::mcp::get_mcp)
                .delete(routes::mcp::delete_mcp),
        )
        // Management API
        .route("/api/v1/auth/login", post(routes::management::login))
        .route(
            "/api/v1/users",
            post(routes::management::create_user).get(routes::management::list_users),
        )
        .route("/api/v1/users/{id}", delete(routes::management::delete_user))
        .route(
            "/api/v1/mcps",
            post(routes::management::create_mcp).get(routes::management::list_mcps),
        )
        .route(
            "/api/v1/mcps/{namespace}",
            get(routes::management::get_mcp)
                .put(routes::management::update_mcp)
                .delete(routes::management::delete_mcp),
        )
        .route(
            "/api/v1/bundles",
            post(routes::management::create_bundle).get(routes::management::list_bundles),
        )
        .route(
            "/api/v1/bundles/{id}",
            get(routes::management::get_bundle)
                .put(routes::management::update_bundle)
                .delete(routes::management::delete_bundle),
        )
        .route(
            "/api/v1/bundles/{id}/tokens",
            post(routes::management::issue_token).get(routes::management::list_tokens),
        )
        .route(
            "/api/v1/tokens/{id}",
            delete(routes::management::revoke_token),
        )
        // Credential API
        .route(
            "/api/v1/credentials",
            get(routes::credentials::list_credentials),
        )
        .route(
            "/api/v1/credentials/{namespace}",
            post(routes::credentials::bind_credential)
                .put(routes::credentials::update_credential)
                .delete(routes::credentials::remove_credential),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// First start against an empty database: create the bootstrap admin and
/// print their API key once.
pub async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    use bundlemux_api_types::User;
    use bundlemux_core::{hash_token, mint_admin_key, mint_token, sha256_hex};

    if state.repositories.users().count().await? > 0 {
        return Ok(());
    }

    let api_key = mint_admin_key();
    // Random password; the operator logs in with the API key and can rotate
    let password = mint_token();
    let user = state
        .repositories
        .users()
        .create(User {
            id: 0,
            uuid: uuid::Uuid::new_v4(),
            username: "admin".to_string(),
            password_hash: sha256_hex(&password),
            api_key_hash: Some(hash_token(&api_key)),
            created_by: None,
            is_admin: true,
            created_at: chrono::Utc::now(),
            last_login_at: None,
        })
        .await?;

    tracing::warn!(
        user = %user.username,
        "bootstrap admin created; API key (shown once): {}",
        api_key
    );
    Ok(())
}

/// Run the gateway until interrupted, then drain sessions and the pool.
pub async fn run(config: BundlemuxConfig) -> anyhow::Result<()> {
    let bind = format!("{}:{}", config.server.bind_address, config.server.port);
    let state = build_state(config).await?;
    bootstrap_admin(&state).await?;

    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!(address = %bind, "bundlemux listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await
    .context("server error")?;

    state.sessions.close_all().await;
    state.pool.shutdown().await;
    Ok(())
}
