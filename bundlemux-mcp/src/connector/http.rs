//! Streamable-HTTP upstream connector
//!
//! One reqwest client per upstream. Requests are JSON-RPC POSTs against the
//! configured URL; the upstream may answer with a plain JSON body or with a
//! short SSE stream that interleaves notifications before the response.
//! List-changed notifications seen on either path are re-emitted as
//! connector events.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bundlemux_api_types::AuthConfig;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    ClientInfo, GetPromptParams, GetPromptResult, InitializeParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, ReadResourceResult,
    ServerCapabilities, ToolCallParams, ToolCallResult, MCP_PROTOCOL_VERSION,
    NOTIFICATION_PROMPTS_CHANGED, NOTIFICATION_RESOURCES_CHANGED, NOTIFICATION_TOOLS_CHANGED,
};

use super::{
    ConnectionState, ConnectorEvent, ConnectorEventKind, EventSubscribers, UpstreamConnector,
};

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Configuration for one HTTP upstream connection.
#[derive(Debug, Clone)]
pub struct HttpConnectorConfig {
    pub namespace: String,
    pub url: String,
    pub auth: AuthConfig,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

/// Streamable-HTTP implementation of [`UpstreamConnector`].
pub struct HttpConnector {
    config: HttpConnectorConfig,
    client: reqwest::Client,
    state: RwLock<ConnectionState>,
    capabilities: RwLock<Option<ServerCapabilities>>,
    /// Upstream-issued session id, replayed on every request once present
    upstream_session: RwLock<Option<String>>,
    next_id: AtomicI64,
    subscribers: EventSubscribers,
}

impl HttpConnector {
    pub fn new(config: HttpConnectorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            state: RwLock::new(ConnectionState::Idle),
            capabilities: RwLock::new(None),
            upstream_session: RwLock::new(None),
            next_id: AtomicI64::new(1),
            subscribers: EventSubscribers::new(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().expect("state lock poisoned") = state;
    }

    fn emit(&self, kind: ConnectorEventKind) {
        self.subscribers.emit(ConnectorEvent {
            namespace: self.config.namespace.clone(),
            kind,
        });
    }

    fn ensure_connected(&self) -> GatewayResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(GatewayError::not_connected(&self.config.namespace))
        }
    }

    fn build_post(&self, body: &JsonRpcRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.config.url)
            .timeout(self.config.request_timeout)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, ACCEPT_BOTH)
            .json(body);

        if let Some(session) = self
            .upstream_session
            .read()
            .expect("session lock poisoned")
            .clone()
        {
            builder = builder.header(SESSION_HEADER, session);
        }

        builder = match &self.config.auth {
            AuthConfig::None => builder,
            AuthConfig::Bearer { token } => builder.bearer_auth(token),
            AuthConfig::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            AuthConfig::ApiKey { key, header } => builder.header(header.as_str(), key.as_str()),
        };

        builder
    }

    /// POST one request and await its response, honoring cancellation.
    async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
        cancel: &CancellationToken,
    ) -> GatewayResult<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = params
            .map(|value| serde_json::to_value(value))
            .transpose()?;
        let request = JsonRpcRequest::new(method, params, Some(json!(id)));

        let response = tokio::select! {
            outcome = self.dispatch(&request) => outcome?,
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
        };

        if let Some(error) = response.error {
            return Err(GatewayError::Upstream {
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    /// Send one notification; failures are reported but carry no response.
    async fn notify(&self, method: &str) -> GatewayResult<()> {
        let notification = JsonRpcRequest::notification(method, None);
        let response = self.build_post(&notification).send().await?;
        if !response.status().is_success() && response.status() != http::StatusCode::ACCEPTED {
            return Err(GatewayError::transport(format!(
                "notification '{}' rejected with status {}",
                method,
                response.status()
            )));
        }
        Ok(())
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> GatewayResult<JsonRpcResponse> {
        let response = self.build_post(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::transport(format!(
                "upstream returned status {}",
                status
            )));
        }

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self
                .upstream_session
                .write()
                .expect("session lock poisoned") = Some(session.to_string());
        }

        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            self.read_sse_response(response, request.id.clone()).await
        } else {
            Ok(response.json::<JsonRpcResponse>().await?)
        }
    }

    /// Scan an SSE body for the response to `id`, re-emitting any
    /// notifications encountered on the way.
    async fn read_sse_response(
        &self,
        response: reqwest::Response,
        id: Option<Value>,
    ) -> GatewayResult<JsonRpcResponse> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(boundary) = buffer.find("\n\n") {
                let event: String = buffer.drain(..boundary + 2).collect();
                let Some(data) = sse_event_data(&event) else {
                    continue;
                };

                if let Ok(rpc_response) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    if rpc_response.result.is_some() || rpc_response.error.is_some() {
                        if rpc_response.id == id {
                            return Ok(rpc_response);
                        }
                        continue;
                    }
                }

                if let Ok(notification) = serde_json::from_str::<JsonRpcRequest>(&data) {
                    self.handle_notification(&notification.method);
                }
            }
        }

        Err(GatewayError::transport(
            "upstream stream ended without a response",
        ))
    }

    fn handle_notification(&self, method: &str) {
        let kind = match method {
            NOTIFICATION_TOOLS_CHANGED => Some(ConnectorEventKind::ToolsListChanged),
            NOTIFICATION_RESOURCES_CHANGED => Some(ConnectorEventKind::ResourcesListChanged),
            NOTIFICATION_PROMPTS_CHANGED => Some(ConnectorEventKind::PromptsListChanged),
            _ => None,
        };
        if let Some(kind) = kind {
            tracing::debug!(namespace = %self.config.namespace, method, "forwarding list-changed notification");
            self.emit(kind);
        }
    }

    async fn handshake(&self) -> GatewayResult<()> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Default::default(),
            client_info: Some(ClientInfo {
                name: "bundlemux".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
        };

        let cancel = CancellationToken::new();
        let result: InitializeResult = self
            .request("initialize", Some(params), &cancel)
            .await?;

        *self
            .capabilities
            .write()
            .expect("capabilities lock poisoned") = Some(result.capabilities);

        self.notify("notifications/initialized").await?;
        Ok(())
    }
}

#[async_trait]
impl UpstreamConnector for HttpConnector {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn state(&self) -> ConnectionState {
        *self.state.read().expect("state lock poisoned")
    }

    fn capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities
            .read()
            .expect("capabilities lock poisoned")
            .clone()
    }

    async fn connect(&self) -> GatewayResult<()> {
        self.set_state(ConnectionState::Connecting);

        match tokio::time::timeout(self.config.connect_timeout, self.handshake()).await {
            Ok(Ok(())) => {
                self.set_state(ConnectionState::Connected);
                self.emit(ConnectorEventKind::Connected);
                tracing::info!(namespace = %self.config.namespace, url = %self.config.url, "upstream connected");
                Ok(())
            }
            Ok(Err(err)) => {
                self.set_state(ConnectionState::Failed);
                self.emit(ConnectorEventKind::ConnectionFailed);
                Err(GatewayError::connection_failed(
                    &self.config.namespace,
                    err.to_string(),
                ))
            }
            Err(_) => {
                self.set_state(ConnectionState::Failed);
                self.emit(ConnectorEventKind::ConnectionFailed);
                Err(GatewayError::connection_failed(
                    &self.config.namespace,
                    format!("no response within {:?}", self.config.connect_timeout),
                ))
            }
        }
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        let session = self
            .upstream_session
            .write()
            .expect("session lock poisoned")
            .take();

        // Streamable-HTTP upstreams accept an explicit session delete
        if let Some(session) = session {
            let _ = self
                .client
                .delete(&self.config.url)
                .header(SESSION_HEADER, session)
                .timeout(self.config.request_timeout)
                .send()
                .await;
        }

        self.set_state(ConnectionState::Disconnected);
        self.emit(ConnectorEventKind::Disconnected);
        Ok(())
    }

    async fn reconnect(&self) -> GatewayResult<()> {
        self.emit(ConnectorEventKind::ReconnectionAttempt);
        if self.is_connected() {
            self.disconnect().await?;
        }
        self.connect().await
    }

    fn subscribe(&self, subscriber_id: &str, sender: mpsc::UnboundedSender<ConnectorEvent>) {
        self.subscribers.subscribe(subscriber_id, sender);
    }

    fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.unsubscribe(subscriber_id);
    }

    async fn list_tools(&self, cancel: CancellationToken) -> GatewayResult<ListToolsResult> {
        self.ensure_connected()?;
        self.request::<Value, _>("tools/list", None, &cancel).await
    }

    async fn call_tool(
        &self,
        params: ToolCallParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ToolCallResult> {
        self.ensure_connected()?;
        self.request("tools/call", Some(params), &cancel).await
    }

    async fn list_resources(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourcesResult> {
        self.ensure_connected()?;
        self.request::<Value, _>("resources/list", None, &cancel)
            .await
    }

    async fn read_resource(
        &self,
        params: ReadResourceParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ReadResourceResult> {
        self.ensure_connected()?;
        self.request("resources/read", Some(params), &cancel).await
    }

    async fn list_resource_templates(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourceTemplatesResult> {
        self.ensure_connected()?;
        self.request::<Value, _>("resources/templates/list", None, &cancel)
            .await
    }

    async fn list_prompts(&self, cancel: CancellationToken) -> GatewayResult<ListPromptsResult> {
        self.ensure_connected()?;
        self.request::<Value, _>("prompts/list", None, &cancel)
            .await
    }

    async fn get_prompt(
        &self,
        params: GetPromptParams,
        cancel: CancellationToken,
    ) -> GatewayResult<GetPromptResult> {
        self.ensure_connected()?;
        self.request("prompts/get", Some(params), &cancel).await
    }
}

/// Join `data:` lines of one SSE event.
fn sse_event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| {
            line.strip_prefix("data:")
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Creates [`HttpConnector`] instances for resolved upstream configs.
#[derive(Debug, Clone)]
pub struct HttpConnectorFactory {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl HttpConnectorFactory {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }
}

impl crate::session::ConnectorFactory for HttpConnectorFactory {
    fn create(
        &self,
        upstream: &crate::resolver::ResolvedUpstream,
    ) -> std::sync::Arc<dyn UpstreamConnector> {
        std::sync::Arc::new(HttpConnector::new(HttpConnectorConfig {
            namespace: upstream.namespace.clone(),
            url: upstream.url.clone(),
            auth: upstream.auth.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }))
    }
}
