//! Token-to-bundle resolution
//!
//! Turns an opaque bearer token into the fully-resolved list of upstream
//! configs a session will attach. Resolution is read-only apart from
//! logging; every failure mode that aborts session creation is mapped
//! here ([`GatewayError::UnauthorizedToken`], [`GatewayError::NotFound`]),
//! while per-entry credential problems degrade to skipping that entry.

use std::sync::Arc;

use bundlemux_api_types::{AuthConfig, AuthStrategy, McpPermissions};
use bundlemux_config::ResolverConfig;
use bundlemux_core::hash_token;
use bundlemux_interfaces::RepositoryFactory;

use crate::error::{GatewayError, GatewayResult};

/// A fully-resolved upstream: everything a session needs to attach it.
#[derive(Debug, Clone)]
pub struct ResolvedUpstream {
    pub mcp_id: i32,
    pub namespace: String,
    pub url: String,
    pub stateless: bool,
    /// `None` means allow-all (internal contexts such as the wildcard path)
    pub permissions: Option<McpPermissions>,
    pub auth: AuthConfig,
}

/// Output of token resolution.
#[derive(Debug, Clone)]
pub struct BundleDescriptor {
    pub bundle_id: i32,
    pub name: String,
    pub upstreams: Vec<ResolvedUpstream>,
    /// Namespaces dropped because their `UserSet` credential was missing;
    /// surfaced to clients in the initialize result metadata
    pub skipped_namespaces: Vec<String>,
}

/// Resolves bearer tokens against the repositories.
pub struct BundleResolver {
    repositories: Arc<dyn RepositoryFactory>,
    config: ResolverConfig,
}

impl BundleResolver {
    pub fn new(repositories: Arc<dyn RepositoryFactory>, config: ResolverConfig) -> Self {
        Self {
            repositories,
            config,
        }
    }

    /// Resolve a token into a bundle descriptor.
    pub async fn resolve(&self, token: &str) -> GatewayResult<BundleDescriptor> {
        if self.is_wildcard(token) {
            return self.resolve_wildcard().await;
        }

        let record = self
            .repositories
            .tokens()
            .find_by_hash(&hash_token(token))
            .await?
            .ok_or_else(|| GatewayError::unauthorized("unknown token"))?;

        if !record.is_valid_at(chrono::Utc::now()) {
            return Err(GatewayError::unauthorized("token revoked or expired"));
        }

        let bundle = self
            .repositories
            .bundles()
            .find_by_id(record.bundle_id)
            .await?
            .ok_or_else(|| GatewayError::not_found("bundle", record.bundle_id))?;

        let mut upstreams = Vec::with_capacity(bundle.entries.len());
        let mut skipped_namespaces = Vec::new();

        for entry in &bundle.entries {
            let Some(mcp) = self
                .repositories
                .mcp_servers()
                .find_by_id(entry.mcp_id)
                .await?
            else {
                tracing::warn!(
                    bundle = %bundle.name,
                    mcp_id = entry.mcp_id,
                    "bundle entry references a deleted MCP; skipping"
                );
                continue;
            };

            let auth = match mcp.auth_strategy {
                AuthStrategy::None => AuthConfig::None,
                AuthStrategy::Master => match mcp.auth {
                    // The repository already decrypted (or policy-substituted)
                    Some(auth) => auth,
                    None => {
                        tracing::warn!(
                            namespace = %mcp.namespace,
                            "master-auth MCP has no auth material; continuing unauthenticated"
                        );
                        AuthConfig::None
                    }
                },
                AuthStrategy::UserSet => {
                    match self
                        .repositories
                        .credentials()
                        .find_by_token_and_mcp(record.id, mcp.id)
                        .await?
                    {
                        Some(credential) => credential.auth,
                        None => {
                            tracing::info!(
                                namespace = %mcp.namespace,
                                token_id = record.id,
                                "no credential bound for user-set MCP; skipping entry"
                            );
                            skipped_namespaces.push(mcp.namespace.clone());
                            continue;
                        }
                    }
                }
            };

            upstreams.push(ResolvedUpstream {
                mcp_id: mcp.id,
                namespace: mcp.namespace,
                url: mcp.url,
                stateless: mcp.stateless,
                permissions: Some(entry.permissions.clone()),
                auth,
            });
        }

        Ok(BundleDescriptor {
            bundle_id: bundle.id,
            name: bundle.name,
            upstreams,
            skipped_namespaces,
        })
    }

    fn is_wildcard(&self, token: &str) -> bool {
        self.config.wildcard_allow
            && self
                .config
                .wildcard_token
                .as_deref()
                .map(|wildcard| wildcard == token)
                .unwrap_or(false)
    }

    /// The development bypass: every MCP that can be used without a
    /// per-token credential, under allow-all permissions.
    async fn resolve_wildcard(&self) -> GatewayResult<BundleDescriptor> {
        tracing::warn!("wildcard token resolved; per-bundle scoping is bypassed");

        let mut upstreams = Vec::new();
        for mcp in self.repositories.mcp_servers().list_all().await? {
            let auth = match mcp.auth_strategy {
                AuthStrategy::None => AuthConfig::None,
                AuthStrategy::Master => match mcp.auth {
                    Some(auth) => auth,
                    None => {
                        tracing::debug!(namespace = %mcp.namespace, "skipping master MCP without auth");
                        continue;
                    }
                },
                AuthStrategy::UserSet => {
                    tracing::debug!(namespace = %mcp.namespace, "skipping user-set MCP for wildcard");
                    continue;
                }
            };

            upstreams.push(ResolvedUpstream {
                mcp_id: mcp.id,
                namespace: mcp.namespace,
                url: mcp.url,
                stateless: mcp.stateless,
                permissions: Some(McpPermissions::allow_all()),
                auth,
            });
        }

        Ok(BundleDescriptor {
            bundle_id: 0,
            name: "all".to_string(),
            upstreams,
            skipped_namespaces: Vec::new(),
        })
    }
}
