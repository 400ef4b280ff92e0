//! MCP client ingress
//!
//! Streamable-HTTP profile: `POST /mcp` creates a session (an
//! `initialize` request with a bearer token) or dispatches an operation
//! into an existing one (`mcp-session-id` header); `GET /mcp` opens the
//! server-initiated event stream; `DELETE /mcp` tears the session down.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::Stream;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use bundlemux_mcp::protocol::{
    GetPromptParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ReadResourceParams, ServerCapabilities, ServerInfo, ToolCallParams, MCP_PROTOCOL_VERSION,
    NOTIFICATION_PROMPTS_CHANGED, NOTIFICATION_RESOURCES_CHANGED, NOTIFICATION_TOOLS_CHANGED,
};
use bundlemux_mcp::{
    ConnectorEventKind, GatewayError, Session, SessionConfig, SessionShutdown,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::{bearer_token, client_key};

const SESSION_HEADER: &str = "mcp-session-id";

/// Both MIME types must be acceptable on every ingress request.
fn check_accept(headers: &HeaderMap) -> Result<(), ApiError> {
    let accept = headers
        .get(http::header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if accept.contains("application/json") && accept.contains("text/event-stream") {
        Ok(())
    } else {
        Err(ApiError::NotAcceptable)
    }
}

fn session_id(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    match headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {} header", SESSION_HEADER))),
        None => Ok(None),
    }
}

async fn lookup_session(state: &AppState, id: Uuid) -> ApiResult<Arc<Session>> {
    state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::Gateway(GatewayError::not_found("session", id)))
}

/// `POST /mcp`
pub async fn post_mcp(
    State(state): State<AppState>,
    peer: super::PeerAddr,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> ApiResult<Response> {
    check_accept(&headers)?;
    state
        .rate_limiter
        .check(&client_key(&headers, peer.0))
        .await?;

    match session_id(&headers)? {
        Some(id) => {
            let session = lookup_session(&state, id).await?;
            let response = dispatch(&session, request).await;
            Ok(Json(response).into_response())
        }
        None => create_session(&state, &headers, request).await,
    }
}

/// The session-creating `initialize` path.
async fn create_session(
    state: &AppState,
    headers: &HeaderMap,
    request: JsonRpcRequest,
) -> ApiResult<Response> {
    if request.method != "initialize" {
        let error = JsonRpcError::invalid_request(Some(json!(
            "first request must be initialize or carry a session id"
        )));
        let body = Json(JsonRpcResponse::error(error, request.id));
        return Ok((StatusCode::BAD_REQUEST, body).into_response());
    }

    let token = bearer_token(headers)?;
    if state.sessions.at_capacity().await {
        return Err(ApiError::CapacityExhausted);
    }

    let descriptor = state.resolver.resolve(token).await.map_err(ApiError::from)?;

    let session = Session::new(
        descriptor.bundle_id,
        descriptor.name.clone(),
        descriptor.skipped_namespaces.clone(),
        SessionConfig::from(&state.config.gateway),
        state.namespaces.clone(),
    );

    for upstream in &descriptor.upstreams {
        if let Err(err) = session
            .attach_upstream(upstream, &state.pool, state.connector_factory.as_ref())
            .await
        {
            // The session continues with whatever attached
            tracing::warn!(
                session = %session.id(),
                namespace = %upstream.namespace,
                error = %err,
                "upstream attach failed"
            );
        }
    }
    session.mark_ready().await;

    state.sessions.insert(session.clone()).await?;

    let mut result = InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities::default(),
        server_info: ServerInfo {
            name: "bundlemux".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        metadata: Default::default(),
    };
    result
        .metadata
        .insert("bundle".to_string(), json!(session.bundle_name()));
    if !session.skipped_namespaces().is_empty() {
        result.metadata.insert(
            "skippedNamespaces".to_string(),
            json!(session.skipped_namespaces()),
        );
    }

    let upstream_count = session.attached_namespaces().await.len();
    tracing::info!(
        session = %session.id(),
        bundle = %session.bundle_name(),
        upstreams = upstream_count,
        "session created"
    );

    let response = JsonRpcResponse::success(serde_json::to_value(result)?, request.id);
    Ok((
        [(SESSION_HEADER, session.id().to_string())],
        Json(response),
    )
        .into_response())
}

/// Route one session-scoped JSON-RPC request. Errors become JSON-RPC
/// error objects, not transport failures.
async fn dispatch(session: &Arc<Session>, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    let cancel = CancellationToken::new();

    let outcome: Result<Value, GatewayError> = match request.method.as_str() {
        "ping" => Ok(json!({})),
        "notifications/initialized" | "notifications/cancelled" => Ok(json!({})),
        "tools/list" => session
            .list_tools(cancel)
            .await
            .and_then(|result| Ok(serde_json::to_value(result)?)),
        "tools/call" => match parse_params::<ToolCallParams>(request.params) {
            Ok(params) => session
                .call_tool(params, cancel)
                .await
                .and_then(|result| Ok(serde_json::to_value(result)?)),
            Err(error) => return JsonRpcResponse::error(error, id),
        },
        "resources/list" => session
            .list_resources(cancel)
            .await
            .and_then(|result| Ok(serde_json::to_value(result)?)),
        "resources/read" => match parse_params::<ReadResourceParams>(request.params) {
            Ok(params) => session
                .read_resource(params, cancel)
                .await
                .and_then(|result| Ok(serde_json::to_value(result)?)),
            Err(error) => return JsonRpcResponse::error(error, id),
        },
        "resources/templates/list" => session
            .list_resource_templates(cancel)
            .await
            .and_then(|result| Ok(serde_json::to_value(result)?)),
        "prompts/list" => session
            .list_prompts(cancel)
            .await
            .and_then(|result| Ok(serde_json::to_value(result)?)),
        "prompts/get" => match parse_params::<GetPromptParams>(request.params) {
            Ok(params) => session
                .get_prompt(params, cancel)
                .await
                .and_then(|result| Ok(serde_json::to_value(result)?)),
            Err(error) => return JsonRpcResponse::error(error, id),
        },
        other => {
            return JsonRpcResponse::error(JsonRpcError::method_not_found(other), id);
        }
    };

    match outcome {
        Ok(result) => JsonRpcResponse::success(result, id),
        Err(err) => JsonRpcResponse::error(err.to_jsonrpc_error(), id),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>,
) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|err| JsonRpcError::invalid_params(err.to_string()))
}

/// `GET /mcp` - server-initiated event stream for an existing session.
pub async fn get_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    check_accept(&headers)?;
    let id = session_id(&headers)?
        .ok_or_else(|| ApiError::BadRequest(format!("{} header required", SESSION_HEADER)))?;
    let session = lookup_session(&state, id).await?;

    let subscriber_id = format!("stream-{}", Uuid::new_v4());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<SessionShutdown>();

    session
        .subscribe_upstream_events(&subscriber_id, event_tx)
        .await
        .map_err(ApiError::from)?;
    session.subscribe_shutdown(&subscriber_id, shutdown_tx);

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    let Some(method) = notification_method(event.kind) else { continue };
                    let notification = JsonRpcRequest::notification(method, None);
                    match serde_json::to_string(&notification) {
                        Ok(data) => yield Ok(Event::default().event("message").data(data)),
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize notification");
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn notification_method(kind: ConnectorEventKind) -> Option<&'static str> {
    match kind {
        ConnectorEventKind::ToolsListChanged => Some(NOTIFICATION_TOOLS_CHANGED),
        ConnectorEventKind::ResourcesListChanged => Some(NOTIFICATION_RESOURCES_CHANGED),
        ConnectorEventKind::PromptsListChanged => Some(NOTIFICATION_PROMPTS_CHANGED),
        _ => None,
    }
}

/// `DELETE /mcp` - close a session.
pub async fn delete_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    check_accept(&headers)?;
    let id = session_id(&headers)?
        .ok_or_else(|| ApiError::BadRequest(format!("{} header required", SESSION_HEADER)))?;

    if state.sessions.close(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Gateway(GatewayError::not_found("session", id)))
    }
}
