//! Shared harness for gateway integration tests
//!
//! Wires the real router and storage (in-memory SQLite) against scriptable
//! mock upstream connectors, so every test drives the stack through HTTP
//! the way a client would.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use bundlemux_api_types::{
    AuthConfig, AuthStrategy, Bundle, BundleEntry, McpPermissions, McpServer, Token, User,
};
use bundlemux_config::BundlemuxConfig;
use bundlemux_core::{hash_token, mint_admin_key, mint_token, CredentialVault, NamespaceResolver};
use bundlemux_interfaces::RepositoryFactory;
use bundlemux_mcp::connector::mock::MockConnector;
use bundlemux_mcp::protocol::Tool;
use bundlemux_mcp::{BundleResolver, ConnectorFactory, ConnectorPool, ResolvedUpstream, UpstreamConnector};
use bundlemux_server::rate_limit::{RateLimitConfig, RateLimiter};
use bundlemux_server::{build_router, AppState, SessionManager};
use bundlemux_storage::{DatabaseConnection, SeaOrmRepositoryFactory};

/// Connector factory serving preset catalogs per namespace.
pub struct ScriptedFactory {
    catalogs: HashMap<String, Vec<Tool>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            catalogs: HashMap::new(),
        }
    }

    pub fn with_tools(mut self, namespace: &str, tool_names: &[&str]) -> Self {
        let tools = tool_names
            .iter()
            .map(|name| Tool {
                name: name.to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
                metadata: Default::default(),
            })
            .collect();
        self.catalogs.insert(namespace.to_string(), tools);
        self
    }
}

impl ConnectorFactory for ScriptedFactory {
    fn create(&self, upstream: &ResolvedUpstream) -> Arc<dyn UpstreamConnector> {
        let tools = self
            .catalogs
            .get(&upstream.namespace)
            .cloned()
            .unwrap_or_default();
        Arc::new(MockConnector::new(&upstream.namespace).with_tools(tools))
    }
}

/// One fully-wired gateway over in-memory storage.
pub struct TestHarness {
    pub router: Router,
    pub state: AppState,
    pub admin: User,
    pub admin_key: String,
}

impl TestHarness {
    pub async fn new(factory: ScriptedFactory) -> Self {
        Self::with_config(factory, BundlemuxConfig::default()).await
    }

    pub async fn with_config(factory: ScriptedFactory, config: BundlemuxConfig) -> Self {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let vault = CredentialVault::from_secret("integration-harness-secret-32chars!").unwrap();
        let repositories = Arc::new(SeaOrmRepositoryFactory::new(
            db,
            vault,
            config.security.decrypt_failure_policy(),
        ));

        let admin_key = mint_admin_key();
        let admin = repositories
            .users()
            .create(User {
                id: 0,
                uuid: Uuid::new_v4(),
                username: "root".to_string(),
                password_hash: bundlemux_core::sha256_hex("root-password"),
                api_key_hash: Some(hash_token(&admin_key)),
                created_by: None,
                is_admin: true,
                created_at: Utc::now(),
                last_login_at: None,
            })
            .await
            .unwrap();

        let resolver = Arc::new(BundleResolver::new(
            repositories.clone(),
            config.resolver.clone(),
        ));

        let state = AppState {
            repositories,
            resolver,
            sessions: Arc::new(SessionManager::new(config.server.max_sessions)),
            pool: Arc::new(ConnectorPool::new()),
            namespaces: Arc::new(NamespaceResolver::default()),
            connector_factory: Arc::new(factory),
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
                config.server.rate_limit_per_minute,
            ))),
            config: Arc::new(config),
        };

        Self {
            router: build_router(state.clone()),
            state,
            admin,
            admin_key,
        }
    }

    /// Register an MCP server row directly through the repositories.
    pub async fn seed_mcp(
        &self,
        namespace: &str,
        stateless: bool,
        strategy: AuthStrategy,
        auth: Option<AuthConfig>,
    ) -> McpServer {
        self.state
            .repositories
            .mcp_servers()
            .create(McpServer {
                id: 0,
                uuid: Uuid::new_v4(),
                namespace: namespace.to_string(),
                url: format!("http://{}/mcp", namespace),
                version: "1.0.0".to_string(),
                stateless,
                auth_strategy: strategy,
                auth,
                created_by: self.admin.id,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    /// Create a bundle over `(mcp id, permissions)` entries and issue one
    /// token for it. Returns the cleartext token.
    pub async fn seed_bundle(&self, name: &str, entries: &[(i32, McpPermissions)]) -> String {
        let entries: Vec<BundleEntry> = entries
            .iter()
            .enumerate()
            .map(|(position, (mcp_id, permissions))| BundleEntry {
                id: 0,
                bundle_id: 0,
                mcp_id: *mcp_id,
                permissions: permissions.clone(),
                position: position as i32,
            })
            .collect();

        let bundle = self
            .state
            .repositories
            .bundles()
            .create(Bundle {
                id: 0,
                uuid: Uuid::new_v4(),
                name: name.to_string(),
                description: None,
                created_by: self.admin.id,
                created_at: Utc::now(),
                entries,
            })
            .await
            .unwrap();

        self.issue_token(bundle.id, None).await
    }

    pub async fn issue_token(
        &self,
        bundle_id: i32,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> String {
        let token = mint_token();
        self.state
            .repositories
            .tokens()
            .create(Token {
                id: 0,
                bundle_id,
                token_hash: hash_token(&token),
                name: "test".to_string(),
                expires_at,
                revoked: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        token
    }

    /// POST a JSON body and return the raw response.
    pub async fn post(
        &self,
        path: &str,
        headers: &[(&str, &str)],
        body: Value,
    ) -> Response<Body> {
        self.request("POST", path, headers, Some(body)).await
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Run the MCP initialize handshake, asserting success and returning
    /// `(session id, initialize result)`.
    pub async fn open_session(&self, token: &str) -> (String, Value) {
        let response = self
            .post(
                "/mcp",
                &[
                    ("accept", "application/json, text/event-stream"),
                    ("authorization", &format!("Bearer {}", token)),
                ],
                initialize_body(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let session_id = response
            .headers()
            .get("mcp-session-id")
            .expect("missing session header")
            .to_str()
            .unwrap()
            .to_string();
        let body = read_json(response).await;
        (session_id, body["result"].clone())
    }

    /// Dispatch one JSON-RPC method on an open session.
    pub async fn rpc(&self, session_id: &str, method: &str, params: Value) -> Value {
        let response = self
            .post(
                "/mcp",
                &[
                    ("accept", "application/json, text/event-stream"),
                    ("mcp-session-id", session_id),
                ],
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": method,
                    "params": params,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }
}

pub fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.0.0"},
        },
    })
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
