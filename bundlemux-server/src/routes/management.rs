//! Management API
//!
//! Mutations over the repository ports: users, MCP server definitions,
//! bundles and their tokens. Every route except login authenticates with
//! an `mcpa_` admin key; mutations additionally pass the hierarchical
//! authorization predicate (creator or transitive creator).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bundlemux_api_types::{
    AuthStrategy, Bundle, BundleEntry, CreateBundleRequest, CreateMcpServerRequest,
    CreateUserRequest, IssuedToken, McpServer, Token, UpdateBundleRequest,
    UpdateMcpServerRequest, User,
};
use bundlemux_core::{
    hash_token, is_admin_key_format, is_valid_pattern, mint_admin_key, mint_token, sha256_hex,
    validate_namespace,
};
use bundlemux_mcp::GatewayError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Resolve the admin key in `Authorization` to its owning user.
async fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let key = super::bearer_token(headers)?;
    if !is_admin_key_format(key) {
        return Err(ApiError::Gateway(GatewayError::unauthorized(
            "malformed admin key",
        )));
    }
    state
        .repositories
        .users()
        .find_by_api_key_hash(&hash_token(key))
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::unauthorized("unknown admin key")))
}

/// Hierarchical check: `user` may act on a record created by `created_by`.
async fn authorize(state: &AppState, user: &User, created_by: i32) -> ApiResult<()> {
    if state
        .repositories
        .users()
        .is_authorized(user.id, created_by)
        .await
        .map_err(GatewayError::from)?
    {
        Ok(())
    } else {
        Err(ApiError::Gateway(GatewayError::forbidden(
            "record belongs to another user hierarchy",
        )))
    }
}

/// The caller plus everyone they transitively created.
async fn visible_user_ids(state: &AppState, user: &User) -> ApiResult<Vec<i32>> {
    let mut ids = state
        .repositories
        .users()
        .collect_descendant_ids(user.id)
        .await
        .map_err(GatewayError::from)?;
    ids.insert(0, user.id);
    Ok(ids)
}

fn validate_permission_patterns(request: &CreateBundleRequest) -> ApiResult<()> {
    for entry in &request.entries {
        let all = entry
            .permissions
            .allowed_tools
            .iter()
            .chain(&entry.permissions.allowed_resources)
            .chain(&entry.permissions.allowed_prompts);
        for pattern in all {
            if !is_valid_pattern(pattern) {
                return Err(ApiError::Gateway(GatewayError::validation(
                    "permissions",
                    format!("pattern '{}' does not compile", pattern),
                )));
            }
        }
    }
    Ok(())
}

// === Auth ===

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    /// Fresh admin key; shown once, only its hash survives
    pub api_key: String,
}

/// `POST /api/v1/auth/login` - exchange credentials for a fresh admin key.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .repositories
        .users()
        .validate_and_update(&request.username, &sha256_hex(&request.password))
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::unauthorized("invalid credentials")))?;

    let api_key = mint_admin_key();
    state
        .repositories
        .users()
        .update_api_key_hash(user.id, Some(hash_token(&api_key)))
        .await
        .map_err(GatewayError::from)?;

    Ok(Json(LoginResponse { user, api_key }))
}

// === Users ===

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub user: User,
    /// Admin key for the new user; shown once
    pub api_key: String,
}

/// `POST /api/v1/users`
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreatedUserResponse>)> {
    let caller = authenticate_admin(&state, &headers).await?;

    let api_key = mint_admin_key();
    let user = state
        .repositories
        .users()
        .create(User {
            id: 0,
            uuid: Uuid::new_v4(),
            username: request.username,
            password_hash: sha256_hex(&request.password),
            api_key_hash: Some(hash_token(&api_key)),
            created_by: Some(caller.id),
            is_admin: request.is_admin,
            created_at: Utc::now(),
            last_login_at: None,
        })
        .await
        .map_err(GatewayError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse { user, api_key }),
    ))
}

/// `GET /api/v1/users` - the caller and their transitive creations.
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<User>>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let mut users = Vec::new();
    for id in visible_user_ids(&state, &caller).await? {
        if let Some(user) = state
            .repositories
            .users()
            .find_by_id(id)
            .await
            .map_err(GatewayError::from)?
        {
            users.push(user);
        }
    }
    Ok(Json(users))
}

/// `DELETE /api/v1/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let caller = authenticate_admin(&state, &headers).await?;
    let target = state
        .repositories
        .users()
        .find_by_id(id)
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::not_found("user", id)))?;

    match target.created_by {
        Some(created_by) => authorize(&state, &caller, created_by).await?,
        None => {
            return Err(ApiError::Gateway(GatewayError::forbidden(
                "bootstrap users cannot be deleted through the API",
            )))
        }
    }

    state
        .repositories
        .users()
        .delete(id)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// === MCP servers ===

/// `POST /api/v1/mcps`
pub async fn create_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateMcpServerRequest>,
) -> ApiResult<(StatusCode, Json<McpServer>)> {
    let caller = authenticate_admin(&state, &headers).await?;

    validate_namespace(&request.namespace)
        .map_err(|err| ApiError::Gateway(GatewayError::validation("namespace", err.to_string())))?;
    url::Url::parse(&request.url)
        .map_err(|err| ApiError::Gateway(GatewayError::validation("url", err.to_string())))?;
    if request.auth_strategy == AuthStrategy::Master && request.auth.is_none() {
        return Err(ApiError::Gateway(GatewayError::validation(
            "auth",
            "master auth strategy requires auth material",
        )));
    }

    let server = state
        .repositories
        .mcp_servers()
        .create(McpServer {
            id: 0,
            uuid: Uuid::new_v4(),
            namespace: request.namespace,
            url: request.url,
            version: request.version,
            stateless: request.stateless,
            auth_strategy: request.auth_strategy,
            auth: request.auth,
            created_by: caller.id,
            created_at: Utc::now(),
        })
        .await
        .map_err(GatewayError::from)?;

    Ok((StatusCode::CREATED, Json(server)))
}

/// `GET /api/v1/mcps`
pub async fn list_mcps(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<McpServer>>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let servers = if caller.is_admin {
        state
            .repositories
            .mcp_servers()
            .list_all()
            .await
            .map_err(GatewayError::from)?
    } else {
        let ids = visible_user_ids(&state, &caller).await?;
        state
            .repositories
            .mcp_servers()
            .find_by_creators(&ids)
            .await
            .map_err(GatewayError::from)?
    };
    Ok(Json(servers))
}

async fn load_mcp(state: &AppState, namespace: &str) -> ApiResult<McpServer> {
    state
        .repositories
        .mcp_servers()
        .find_by_namespace(namespace)
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::not_found("mcp", namespace)))
}

/// `GET /api/v1/mcps/{namespace}`
pub async fn get_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
) -> ApiResult<Json<McpServer>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let server = load_mcp(&state, &namespace).await?;
    if !caller.is_admin {
        authorize(&state, &caller, server.created_by).await?;
    }
    Ok(Json(server))
}

/// `PUT /api/v1/mcps/{namespace}`
pub async fn update_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
    Json(request): Json<UpdateMcpServerRequest>,
) -> ApiResult<Json<McpServer>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let mut server = load_mcp(&state, &namespace).await?;
    authorize(&state, &caller, server.created_by).await?;

    if let Some(url) = request.url {
        url::Url::parse(&url)
            .map_err(|err| ApiError::Gateway(GatewayError::validation("url", err.to_string())))?;
        server.url = url;
    }
    if let Some(version) = request.version {
        server.version = version;
    }
    if let Some(stateless) = request.stateless {
        server.stateless = stateless;
    }
    if let Some(strategy) = request.auth_strategy {
        server.auth_strategy = strategy;
    }
    if request.auth.is_some() {
        server.auth = request.auth;
    }
    if server.auth_strategy == AuthStrategy::Master && server.auth.is_none() {
        return Err(ApiError::Gateway(GatewayError::validation(
            "auth",
            "master auth strategy requires auth material",
        )));
    }

    let updated = state
        .repositories
        .mcp_servers()
        .update(server)
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(updated))
}

/// `DELETE /api/v1/mcps/{namespace}`
pub async fn delete_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
) -> ApiResult<StatusCode> {
    let caller = authenticate_admin(&state, &headers).await?;
    let server = load_mcp(&state, &namespace).await?;
    authorize(&state, &caller, server.created_by).await?;

    state
        .repositories
        .mcp_servers()
        .delete(server.id)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// === Bundles ===

/// `POST /api/v1/bundles`
pub async fn create_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateBundleRequest>,
) -> ApiResult<(StatusCode, Json<Bundle>)> {
    let caller = authenticate_admin(&state, &headers).await?;
    validate_permission_patterns(&request)?;

    let mut entries = Vec::with_capacity(request.entries.len());
    for (position, entry) in request.entries.iter().enumerate() {
        let server = load_mcp(&state, &entry.namespace).await?;
        entries.push(BundleEntry {
            id: 0,
            bundle_id: 0,
            mcp_id: server.id,
            permissions: entry.permissions.clone(),
            position: position as i32,
        });
    }

    let bundle = state
        .repositories
        .bundles()
        .create(Bundle {
            id: 0,
            uuid: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            created_by: caller.id,
            created_at: Utc::now(),
            entries,
        })
        .await
        .map_err(GatewayError::from)?;

    Ok((StatusCode::CREATED, Json(bundle)))
}

/// `GET /api/v1/bundles`
pub async fn list_bundles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Bundle>>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let ids = visible_user_ids(&state, &caller).await?;
    let bundles = state
        .repositories
        .bundles()
        .list_by_creators(&ids)
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(bundles))
}

async fn load_bundle(state: &AppState, id: i32) -> ApiResult<Bundle> {
    state
        .repositories
        .bundles()
        .find_by_id(id)
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::not_found("bundle", id)))
}

/// `GET /api/v1/bundles/{id}`
pub async fn get_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> ApiResult<Json<Bundle>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let bundle = load_bundle(&state, id).await?;
    authorize(&state, &caller, bundle.created_by).await?;
    Ok(Json(bundle))
}

/// `PUT /api/v1/bundles/{id}`
pub async fn update_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(request): Json<UpdateBundleRequest>,
) -> ApiResult<Json<Bundle>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let mut bundle = load_bundle(&state, id).await?;
    authorize(&state, &caller, bundle.created_by).await?;

    if let Some(name) = request.name {
        bundle.name = name;
    }
    if request.description.is_some() {
        bundle.description = request.description;
    }
    if let Some(entries) = request.entries {
        let probe = CreateBundleRequest {
            name: bundle.name.clone(),
            description: None,
            entries: entries.clone(),
        };
        validate_permission_patterns(&probe)?;

        let mut resolved = Vec::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let server = load_mcp(&state, &entry.namespace).await?;
            resolved.push(BundleEntry {
                id: 0,
                bundle_id: bundle.id,
                mcp_id: server.id,
                permissions: entry.permissions.clone(),
                position: position as i32,
            });
        }
        bundle.entries = resolved;
    }

    let updated = state
        .repositories
        .bundles()
        .update(bundle)
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(updated))
}

/// `DELETE /api/v1/bundles/{id}` - cascades to entries and tokens.
pub async fn delete_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let caller = authenticate_admin(&state, &headers).await?;
    let bundle = load_bundle(&state, id).await?;
    authorize(&state, &caller, bundle.created_by).await?;

    state
        .repositories
        .bundles()
        .delete(id)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// === Tokens ===

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub name: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `POST /api/v1/bundles/{id}/tokens` - the only moment the cleartext
/// token exists.
pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(request): Json<IssueTokenRequest>,
) -> ApiResult<(StatusCode, Json<IssuedToken>)> {
    let caller = authenticate_admin(&state, &headers).await?;
    let bundle = load_bundle(&state, id).await?;
    authorize(&state, &caller, bundle.created_by).await?;

    let token = mint_token();
    let record = state
        .repositories
        .tokens()
        .create(Token {
            id: 0,
            bundle_id: bundle.id,
            token_hash: hash_token(&token),
            name: request.name,
            expires_at: request.expires_at,
            revoked: false,
            created_at: Utc::now(),
        })
        .await
        .map_err(GatewayError::from)?;

    Ok((StatusCode::CREATED, Json(IssuedToken { record, token })))
}

/// `GET /api/v1/bundles/{id}/tokens`
pub async fn list_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> ApiResult<Json<Vec<Token>>> {
    let caller = authenticate_admin(&state, &headers).await?;
    let bundle = load_bundle(&state, id).await?;
    authorize(&state, &caller, bundle.created_by).await?;

    let tokens = state
        .repositories
        .tokens()
        .list_for_bundle(id)
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(tokens))
}

/// `DELETE /api/v1/tokens/{id}` - revoke, keeping the audit trail.
pub async fn revoke_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let caller = authenticate_admin(&state, &headers).await?;
    let token = state
        .repositories
        .tokens()
        .find_by_id(id)
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::not_found("token", id)))?;

    let bundle = load_bundle(&state, token.bundle_id).await?;
    authorize(&state, &caller, bundle.created_by).await?;

    state
        .repositories
        .tokens()
        .revoke(id)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
