//! Credential API for user-set upstreams
//!
//! Token holders bind their own auth material to `(token, mcp)` pairs
//! before opening sessions. Authentication is the bundle token itself via
//! `X-Bundle-Token`; admin keys have no business here.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use bundlemux_api_types::{AuthConfig, AuthStrategy, McpServer, Token};
use bundlemux_core::hash_token;
use bundlemux_mcp::GatewayError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const BUNDLE_TOKEN_HEADER: &str = "x-bundle-token";

/// Resolve `X-Bundle-Token` to a valid token record.
async fn authenticate_token(state: &AppState, headers: &HeaderMap) -> ApiResult<Token> {
    let raw = headers
        .get(BUNDLE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::Gateway(GatewayError::unauthorized("missing X-Bundle-Token header"))
        })?;

    let token = state
        .repositories
        .tokens()
        .find_by_hash(&hash_token(raw))
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::unauthorized("unknown token")))?;

    if !token.is_valid_at(Utc::now()) {
        return Err(ApiError::Gateway(GatewayError::unauthorized(
            "token revoked or expired",
        )));
    }
    Ok(token)
}

/// The MCP must exist and actually take per-token credentials.
async fn load_user_set_mcp(state: &AppState, namespace: &str) -> ApiResult<McpServer> {
    let server = state
        .repositories
        .mcp_servers()
        .find_by_namespace(namespace)
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| ApiError::Gateway(GatewayError::not_found("mcp", namespace)))?;

    if server.auth_strategy != AuthStrategy::UserSet {
        return Err(ApiError::Gateway(GatewayError::validation(
            "namespace",
            format!(
                "mcp '{}' uses the {} auth strategy; credentials are only bound for user_set",
                namespace, server.auth_strategy
            ),
        )));
    }
    Ok(server)
}

/// `GET /api/v1/credentials` - which MCPs have credentials bound for this
/// token. Secrets never leave; only method names do.
pub async fn list_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Value>>> {
    let token = authenticate_token(&state, &headers).await?;

    let credentials = state
        .repositories
        .credentials()
        .list_by_token(token.id)
        .await
        .map_err(GatewayError::from)?;

    let mut listed = Vec::with_capacity(credentials.len());
    for credential in credentials {
        let namespace = state
            .repositories
            .mcp_servers()
            .find_by_id(credential.mcp_id)
            .await
            .map_err(GatewayError::from)?
            .map(|server| server.namespace);
        listed.push(json!({
            "namespace": namespace,
            "method": credential.auth.method_name(),
            "createdAt": credential.created_at,
        }));
    }
    Ok(Json(listed))
}

/// `POST /api/v1/credentials/{namespace}` - bind a credential; 409 when
/// one is already bound.
pub async fn bind_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
    Json(auth): Json<AuthConfig>,
) -> ApiResult<StatusCode> {
    let token = authenticate_token(&state, &headers).await?;
    let server = load_user_set_mcp(&state, &namespace).await?;

    state
        .repositories
        .credentials()
        .bind(token.id, server.id, auth)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::CREATED)
}

/// `PUT /api/v1/credentials/{namespace}` - replace a bound credential.
pub async fn update_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
    Json(auth): Json<AuthConfig>,
) -> ApiResult<StatusCode> {
    let token = authenticate_token(&state, &headers).await?;
    let server = load_user_set_mcp(&state, &namespace).await?;

    state
        .repositories
        .credentials()
        .update_by_token_and_mcp(token.id, server.id, auth)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/v1/credentials/{namespace}` - unbind.
pub async fn remove_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
) -> ApiResult<StatusCode> {
    let token = authenticate_token(&state, &headers).await?;
    let server = load_user_set_mcp(&state, &namespace).await?;

    state
        .repositories
        .credentials()
        .remove(token.id, server.id)
        .await
        .map_err(GatewayError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
