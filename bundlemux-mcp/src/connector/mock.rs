//! Scriptable in-memory connector for tests
//!
//! Serves preset catalogs, records targeted calls, and can be told to fail
//! its next connect. Compiled for unit tests and, behind the `testing`
//! feature, for workspace integration tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    GetPromptParams, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, Prompt, ReadResourceParams, ReadResourceResult,
    Resource, ResourceContent, ServerCapabilities, Tool, ToolCallParams, ToolCallResult,
    ToolContent,
};

use super::{
    ConnectionState, ConnectorEvent, ConnectorEventKind, EventSubscribers, UpstreamConnector,
};

/// In-memory [`UpstreamConnector`] with preset catalogs.
pub struct MockConnector {
    namespace: String,
    state: RwLock<ConnectionState>,
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    prompts: Vec<Prompt>,
    fail_next_connect: AtomicBool,
    tool_calls: Mutex<Vec<String>>,
    resource_reads: Mutex<Vec<String>>,
    subscribers: EventSubscribers,
}

impl MockConnector {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: RwLock::new(ConnectionState::Idle),
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            fail_next_connect: AtomicBool::new(false),
            tool_calls: Mutex::new(Vec::new()),
            resource_reads: Mutex::new(Vec::new()),
            subscribers: EventSubscribers::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_prompts(mut self, prompts: Vec<Prompt>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Make the next connect attempt fail.
    pub fn fail_next_connect(&self) {
        self.fail_next_connect.store(true, Ordering::SeqCst);
    }

    /// Original tool names this connector was asked to call, in order.
    pub fn tool_calls(&self) -> Vec<String> {
        self.tool_calls.lock().expect("call log poisoned").clone()
    }

    /// Original URIs this connector was asked to read, in order.
    pub fn resource_reads(&self) -> Vec<String> {
        self.resource_reads
            .lock()
            .expect("read log poisoned")
            .clone()
    }

    /// Emit a list-changed (or any other) event to subscribers.
    pub fn emit_event(&self, kind: ConnectorEventKind) {
        self.subscribers.emit(ConnectorEvent {
            namespace: self.namespace.clone(),
            kind,
        });
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().expect("state lock poisoned") = state;
    }

    fn ensure_connected(&self) -> GatewayResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(GatewayError::not_connected(&self.namespace))
        }
    }
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn state(&self) -> ConnectionState {
        *self.state.read().expect("state lock poisoned")
    }

    fn capabilities(&self) -> Option<ServerCapabilities> {
        self.is_connected().then(ServerCapabilities::default)
    }

    async fn connect(&self) -> GatewayResult<()> {
        if self.fail_next_connect.swap(false, Ordering::SeqCst) {
            self.set_state(ConnectionState::Failed);
            self.emit_event(ConnectorEventKind::ConnectionFailed);
            return Err(GatewayError::connection_failed(
                &self.namespace,
                "scripted connect failure",
            ));
        }
        self.set_state(ConnectionState::Connected);
        self.emit_event(ConnectorEventKind::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        self.set_state(ConnectionState::Disconnected);
        self.emit_event(ConnectorEventKind::Disconnected);
        Ok(())
    }

    async fn reconnect(&self) -> GatewayResult<()> {
        self.emit_event(ConnectorEventKind::ReconnectionAttempt);
        self.connect().await
    }

    fn subscribe(&self, subscriber_id: &str, sender: mpsc::UnboundedSender<ConnectorEvent>) {
        self.subscribers.subscribe(subscriber_id, sender);
    }

    fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.unsubscribe(subscriber_id);
    }

    async fn list_tools(&self, _cancel: CancellationToken) -> GatewayResult<ListToolsResult> {
        self.ensure_connected()?;
        Ok(ListToolsResult {
            tools: self.tools.clone(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        params: ToolCallParams,
        _cancel: CancellationToken,
    ) -> GatewayResult<ToolCallResult> {
        self.ensure_connected()?;
        if !self.tools.iter().any(|tool| tool.name == params.name) {
            return Err(GatewayError::unknown_capability(&params.name));
        }
        self.tool_calls
            .lock()
            .expect("call log poisoned")
            .push(params.name.clone());
        Ok(ToolCallResult {
            content: vec![ToolContent::Text {
                text: format!("{} executed {}", self.namespace, params.name),
            }],
            is_error: false,
        })
    }

    async fn list_resources(
        &self,
        _cancel: CancellationToken,
    ) -> GatewayResult<ListResourcesResult> {
        self.ensure_connected()?;
        Ok(ListResourcesResult {
            resources: self.resources.clone(),
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        params: ReadResourceParams,
        _cancel: CancellationToken,
    ) -> GatewayResult<ReadResourceResult> {
        self.ensure_connected()?;
        self.resource_reads
            .lock()
            .expect("read log poisoned")
            .push(params.uri.clone());
        Ok(ReadResourceResult {
            contents: vec![ResourceContent::Text {
                uri: params.uri,
                text: "mock contents".to_string(),
                mime_type: Some("text/plain".to_string()),
            }],
        })
    }

    async fn list_resource_templates(
        &self,
        _cancel: CancellationToken,
    ) -> GatewayResult<ListResourceTemplatesResult> {
        self.ensure_connected()?;
        Ok(ListResourceTemplatesResult::default())
    }

    async fn list_prompts(&self, _cancel: CancellationToken) -> GatewayResult<ListPromptsResult> {
        self.ensure_connected()?;
        Ok(ListPromptsResult {
            prompts: self.prompts.clone(),
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        params: GetPromptParams,
        _cancel: CancellationToken,
    ) -> GatewayResult<GetPromptResult> {
        self.ensure_connected()?;
        let prompt = self
            .prompts
            .iter()
            .find(|prompt| prompt.name == params.name)
            .ok_or_else(|| GatewayError::unknown_capability(&params.name))?;
        Ok(GetPromptResult {
            description: prompt.description.clone(),
            messages: vec![crate::protocol::PromptMessage {
                role: "user".to_string(),
                content: json!({"type": "text", "text": prompt.name}),
            }],
        })
    }
}
