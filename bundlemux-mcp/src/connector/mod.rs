//! Upstream connectors
//!
//! An [`UpstreamConnector`] is one MCP client: it owns the connection to a
//! single upstream server and exposes the typed MCP operations. The
//! [`FilteredConnector`] decorator layers namespace renaming and allow-list
//! enforcement on top; the [`pool`] shares stateless base connectors across
//! sessions.

pub mod filtered;
pub mod http;
pub mod pool;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayResult;
use crate::protocol::{
    GetPromptParams, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, ReadResourceResult,
    ServerCapabilities, ToolCallParams, ToolCallResult,
};

pub use filtered::FilteredConnector;
pub use http::{HttpConnector, HttpConnectorConfig, HttpConnectorFactory};
pub use pool::{pool_key, ConnectorPool};

/// Connection lifecycle of a single upstream.
///
/// `Failed` is terminal for the current attempt; `reconnect` moves the
/// machine back through `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// Event kinds a connector can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorEventKind {
    Connected,
    Disconnected,
    ConnectionFailed,
    ReconnectionAttempt,
    Shutdown,
    ToolsListChanged,
    ResourcesListChanged,
    PromptsListChanged,
}

/// An event emitted by a connector, tagged with its namespace.
#[derive(Debug, Clone)]
pub struct ConnectorEvent {
    pub namespace: String,
    pub kind: ConnectorEventKind,
}

/// Keyed event subscription: one channel per subscriber id, re-subscribing
/// under the same id replaces the previous channel (last writer wins).
#[derive(Default)]
pub struct EventSubscribers {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<ConnectorEvent>>>,
}

impl EventSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber_id: &str, sender: mpsc::UnboundedSender<ConnectorEvent>) {
        self.senders
            .lock()
            .expect("subscriber lock poisoned")
            .insert(subscriber_id.to_string(), sender);
    }

    pub fn unsubscribe(&self, subscriber_id: &str) {
        self.senders
            .lock()
            .expect("subscriber lock poisoned")
            .remove(subscriber_id);
    }

    /// Deliver an event to every live subscriber, pruning closed channels.
    pub fn emit(&self, event: ConnectorEvent) {
        let mut senders = self.senders.lock().expect("subscriber lock poisoned");
        senders.retain(|_, sender| sender.send(event.clone()).is_ok());
    }
}

/// One MCP client for exactly one upstream server.
///
/// Operations take a [`CancellationToken`] threaded down from the inbound
/// client request; connectors abandon the upstream call when it fires.
/// Every operation fails with `NotConnected` while the connector is not in
/// the `Connected` state.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Namespace scoping this upstream's capabilities
    fn namespace(&self) -> &str;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Capabilities reported by the upstream at initialize time
    fn capabilities(&self) -> Option<ServerCapabilities>;

    /// Establish the connection and run the MCP handshake
    async fn connect(&self) -> GatewayResult<()>;

    /// Tear the connection down
    async fn disconnect(&self) -> GatewayResult<()>;

    /// Tear down (best effort) and connect again
    async fn reconnect(&self) -> GatewayResult<()>;

    /// Subscribe to connector events; a subscriber id re-used here replaces
    /// its previous channel
    fn subscribe(&self, subscriber_id: &str, sender: mpsc::UnboundedSender<ConnectorEvent>);

    /// Remove a subscriber
    fn unsubscribe(&self, subscriber_id: &str);

    async fn list_tools(&self, cancel: CancellationToken) -> GatewayResult<ListToolsResult>;

    async fn call_tool(
        &self,
        params: ToolCallParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ToolCallResult>;

    async fn list_resources(&self, cancel: CancellationToken)
        -> GatewayResult<ListResourcesResult>;

    async fn read_resource(
        &self,
        params: ReadResourceParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ReadResourceResult>;

    async fn list_resource_templates(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourceTemplatesResult>;

    async fn list_prompts(&self, cancel: CancellationToken) -> GatewayResult<ListPromptsResult>;

    async fn get_prompt(
        &self,
        params: GetPromptParams,
        cancel: CancellationToken,
    ) -> GatewayResult<GetPromptResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_writer_wins_subscription() {
        let subscribers = EventSubscribers::new();
        let (tx_old, mut rx_old) = mpsc::unbounded_channel();
        let (tx_new, mut rx_new) = mpsc::unbounded_channel();

        subscribers.subscribe("session-1", tx_old);
        subscribers.subscribe("session-1", tx_new);

        subscribers.emit(ConnectorEvent {
            namespace: "github".to_string(),
            kind: ConnectorEventKind::ToolsListChanged,
        });

        assert!(rx_old.try_recv().is_err());
        assert!(rx_new.try_recv().is_ok());
    }

    #[test]
    fn test_unsubscribe_and_pruning() {
        let subscribers = EventSubscribers::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        subscribers.subscribe("a", tx_a);
        subscribers.subscribe("b", tx_b);
        subscribers.unsubscribe("a");
        drop(rx_b);

        subscribers.emit(ConnectorEvent {
            namespace: "n".to_string(),
            kind: ConnectorEventKind::Connected,
        });

        assert!(rx_a.try_recv().is_err());
        // The closed channel was pruned on emit
        assert!(subscribers
            .senders
            .lock()
            .unwrap()
            .is_empty());
    }
}
