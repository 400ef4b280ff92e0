//! Shared application state

use std::sync::Arc;

use bundlemux_config::BundlemuxConfig;
use bundlemux_core::NamespaceResolver;
use bundlemux_interfaces::RepositoryFactory;
use bundlemux_mcp::{BundleResolver, ConnectorFactory, ConnectorPool};

use crate::rate_limit::RateLimiter;
use crate::sessions::SessionManager;

/// Everything the route handlers share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BundlemuxConfig>,
    pub repositories: Arc<dyn RepositoryFactory>,
    pub resolver: Arc<BundleResolver>,
    pub sessions: Arc<SessionManager>,
    pub pool: Arc<ConnectorPool>,
    pub namespaces: Arc<NamespaceResolver>,
    pub connector_factory: Arc<dyn ConnectorFactory>,
    pub rate_limiter: Arc<RateLimiter>,
}
