//! Client session lifecycle and operation routing
//!
//! One session per client connection. The session owns its filtered
//! connectors (sharing stateless base connectors through the pool), routes
//! every inbound operation to exactly one upstream, and shuts itself down
//! when idle. All shared state sits behind one mutex; upstream I/O happens
//! strictly outside of it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use bundlemux_core::NamespaceResolver;

use crate::connector::{pool_key, ConnectorPool, FilteredConnector, UpstreamConnector};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    GetPromptParams, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, ReadResourceResult, ToolCallParams,
    ToolCallResult,
};
use crate::resolver::ResolvedUpstream;

/// Constructs base connectors for resolved upstreams. The HTTP factory is
/// the production implementation; tests substitute mocks.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, upstream: &ResolvedUpstream) -> Arc<dyn UpstreamConnector>;
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Closing,
    Closed,
}

/// Why a session shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Explicit close (client DELETE or server shutdown)
    Explicit,
    /// The idle monitor crossed the threshold
    IdleTimeout,
}

/// The single event a session emits.
#[derive(Debug, Clone)]
pub struct SessionShutdown {
    pub session_id: Uuid,
    pub reason: ShutdownReason,
}

/// Timing knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub idle_check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(20 * 60),
            idle_check_interval: Duration::from_secs(1),
        }
    }
}

impl From<&bundlemux_config::GatewayConfig> for SessionConfig {
    fn from(config: &bundlemux_config::GatewayConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            idle_check_interval: config.idle_check_interval,
        }
    }
}

struct AttachedConnector {
    namespace: String,
    connector: Arc<FilteredConnector>,
    /// Pooled connectors are detached on close, never disconnected
    pooled: bool,
}

struct SessionInner {
    state: SessionState,
    last_activity: Instant,
    /// Attachment order is catalog aggregation order
    connectors: Vec<AttachedConnector>,
}

/// One client connection's runtime state.
pub struct Session {
    id: Uuid,
    bundle_id: i32,
    bundle_name: String,
    created_at: DateTime<Utc>,
    config: SessionConfig,
    resolver: Arc<NamespaceResolver>,
    inner: Mutex<SessionInner>,
    shutdown_subscribers: StdMutex<HashMap<String, mpsc::UnboundedSender<SessionShutdown>>>,
    shutdown_emitted: AtomicBool,
    monitor_started: AtomicBool,
    skipped_namespaces: Vec<String>,
}

impl Session {
    pub fn new(
        bundle_id: i32,
        bundle_name: impl Into<String>,
        skipped_namespaces: Vec<String>,
        config: SessionConfig,
        resolver: Arc<NamespaceResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            bundle_id,
            bundle_name: bundle_name.into(),
            created_at: Utc::now(),
            config,
            resolver,
            inner: Mutex::new(SessionInner {
                state: SessionState::Initializing,
                last_activity: Instant::now(),
                connectors: Vec::new(),
            }),
            shutdown_subscribers: StdMutex::new(HashMap::new()),
            shutdown_emitted: AtomicBool::new(false),
            monitor_started: AtomicBool::new(false),
            skipped_namespaces,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bundle_id(&self) -> i32 {
        self.bundle_id
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Namespaces the resolver skipped for missing credentials.
    pub fn skipped_namespaces(&self) -> &[String] {
        &self.skipped_namespaces
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn attached_namespaces(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .connectors
            .iter()
            .map(|attached| attached.namespace.clone())
            .collect()
    }

    /// Attach one resolved upstream. Stateless upstreams go through the
    /// pool; everything else gets a connector owned by this session.
    /// Attach failures leave the session running with whatever did attach.
    pub async fn attach_upstream(
        self: &Arc<Self>,
        upstream: &ResolvedUpstream,
        pool: &ConnectorPool,
        factory: &dyn ConnectorFactory,
    ) -> GatewayResult<()> {
        {
            let inner = self.inner.lock().await;
            if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                return Err(GatewayError::SessionClosed);
            }
        }

        let key = pool_key(&upstream.namespace, &upstream.url);

        let (base, pooled) = if upstream.stateless {
            match pool.get(&key).await {
                Some(existing) => {
                    if !existing.is_connected() {
                        existing.reconnect().await.map_err(|err| {
                            GatewayError::AttachFailed {
                                namespace: upstream.namespace.clone(),
                                reason: err.to_string(),
                            }
                        })?;
                    }
                    (existing, true)
                }
                None => {
                    let fresh = factory.create(upstream);
                    fresh
                        .connect()
                        .await
                        .map_err(|err| GatewayError::AttachFailed {
                            namespace: upstream.namespace.clone(),
                            reason: err.to_string(),
                        })?;

                    let published = pool.publish(&key, fresh.clone()).await;
                    if !Arc::ptr_eq(&published, &fresh) {
                        // Lost the creation race; ours never gets used
                        let _ = fresh.disconnect().await;
                    }
                    (published, true)
                }
            }
        } else {
            let fresh = factory.create(upstream);
            fresh
                .connect()
                .await
                .map_err(|err| GatewayError::AttachFailed {
                    namespace: upstream.namespace.clone(),
                    reason: err.to_string(),
                })?;
            (fresh, false)
        };

        let filtered = Arc::new(FilteredConnector::new(
            base,
            upstream.namespace.clone(),
            upstream.permissions.clone(),
            self.resolver.clone(),
        ));

        let became_ready = {
            let mut inner = self.inner.lock().await;
            if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                // Closed while we were connecting; release the connector
                drop(inner);
                if !pooled {
                    let _ = filtered.disconnect().await;
                }
                return Err(GatewayError::SessionClosed);
            }

            inner.connectors.push(AttachedConnector {
                namespace: upstream.namespace.clone(),
                connector: filtered,
                pooled,
            });

            if inner.state == SessionState::Initializing {
                inner.state = SessionState::Ready;
                true
            } else {
                false
            }
        };

        if became_ready {
            self.start_idle_monitor();
        }

        tracing::debug!(
            session = %self.id,
            namespace = %upstream.namespace,
            pooled,
            "upstream attached"
        );
        Ok(())
    }

    /// Transition an empty session straight to ready (no upstreams to
    /// attach). Also used after the attach loop so a session whose every
    /// attach failed still serves (empty) catalogs.
    pub async fn mark_ready(self: &Arc<Self>) {
        let became_ready = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Initializing {
                inner.state = SessionState::Ready;
                true
            } else {
                false
            }
        };
        if became_ready {
            self.start_idle_monitor();
        }
    }

    /// Snapshot connectors in attachment order and touch the activity
    /// clock. Fails once the session is closing or closed.
    async fn snapshot(&self) -> GatewayResult<Vec<(String, Arc<FilteredConnector>)>> {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
            return Err(GatewayError::SessionClosed);
        }
        inner.last_activity = Instant::now();
        Ok(inner
            .connectors
            .iter()
            .map(|attached| (attached.namespace.clone(), attached.connector.clone()))
            .collect())
    }

    /// Find the connector owning `namespace` and touch the activity clock.
    async fn route(&self, namespace: &str) -> GatewayResult<Arc<FilteredConnector>> {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
            return Err(GatewayError::SessionClosed);
        }
        inner.last_activity = Instant::now();
        inner
            .connectors
            .iter()
            .find(|attached| attached.namespace == namespace)
            .map(|attached| attached.connector.clone())
            .ok_or_else(|| GatewayError::unknown_capability(namespace))
    }

    pub async fn list_tools(&self, cancel: CancellationToken) -> GatewayResult<ListToolsResult> {
        let mut aggregated = ListToolsResult::default();
        for (namespace, connector) in self.snapshot().await? {
            match connector.list_tools(cancel.clone()).await {
                Ok(mut result) => aggregated.tools.append(&mut result.tools),
                Err(err) => {
                    tracing::warn!(session = %self.id, %namespace, error = %err, "tools/list failed for upstream; omitting");
                }
            }
        }
        Ok(aggregated)
    }

    pub async fn list_resources(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourcesResult> {
        let mut aggregated = ListResourcesResult::default();
        for (namespace, connector) in self.snapshot().await? {
            match connector.list_resources(cancel.clone()).await {
                Ok(mut result) => aggregated.resources.append(&mut result.resources),
                Err(err) => {
                    tracing::warn!(session = %self.id, %namespace, error = %err, "resources/list failed for upstream; omitting");
                }
            }
        }
        Ok(aggregated)
    }

    pub async fn list_resource_templates(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourceTemplatesResult> {
        let mut aggregated = ListResourceTemplatesResult::default();
        for (namespace, connector) in self.snapshot().await? {
            match connector.list_resource_templates(cancel.clone()).await {
                Ok(mut result) => aggregated
                    .resource_templates
                    .append(&mut result.resource_templates),
                Err(err) => {
                    tracing::warn!(session = %self.id, %namespace, error = %err, "resources/templates/list failed for upstream; omitting");
                }
            }
        }
        Ok(aggregated)
    }

    pub async fn list_prompts(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListPromptsResult> {
        let mut aggregated = ListPromptsResult::default();
        for (namespace, connector) in self.snapshot().await? {
            match connector.list_prompts(cancel.clone()).await {
                Ok(mut result) => aggregated.prompts.append(&mut result.prompts),
                Err(err) => {
                    tracing::warn!(session = %self.id, %namespace, error = %err, "prompts/list failed for upstream; omitting");
                }
            }
        }
        Ok(aggregated)
    }

    pub async fn call_tool(
        &self,
        params: ToolCallParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ToolCallResult> {
        let (namespace, _) = self
            .resolver
            .extract_from_name(&params.name)
            .map_err(|_| GatewayError::unknown_capability(&params.name))?;
        let connector = self.route(&namespace).await?;
        connector.call_tool(params, cancel).await
    }

    pub async fn read_resource(
        &self,
        params: ReadResourceParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ReadResourceResult> {
        let (namespace, _) = self.resolver.extract_from_uri(&params.uri);
        let namespace =
            namespace.ok_or_else(|| GatewayError::unknown_capability(&params.uri))?;
        let connector = self.route(&namespace).await?;
        connector.read_resource(params, cancel).await
    }

    pub async fn get_prompt(
        &self,
        params: GetPromptParams,
        cancel: CancellationToken,
    ) -> GatewayResult<GetPromptResult> {
        let (namespace, _) = self
            .resolver
            .extract_from_name(&params.name)
            .map_err(|_| GatewayError::unknown_capability(&params.name))?;
        let connector = self.route(&namespace).await?;
        connector.get_prompt(params, cancel).await
    }

    /// Fan one channel into every attached connector's event stream, so a
    /// client event stream sees list-changed notifications from all
    /// upstreams. Connectors attached later are not covered; the ingress
    /// re-subscribes per stream request.
    pub async fn subscribe_upstream_events(
        &self,
        subscriber_id: &str,
        sender: mpsc::UnboundedSender<crate::connector::ConnectorEvent>,
    ) -> GatewayResult<()> {
        let inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
            return Err(GatewayError::SessionClosed);
        }
        for attached in &inner.connectors {
            attached
                .connector
                .subscribe(subscriber_id, sender.clone());
        }
        Ok(())
    }

    pub async fn unsubscribe_upstream_events(&self, subscriber_id: &str) {
        let inner = self.inner.lock().await;
        for attached in &inner.connectors {
            attached.connector.unsubscribe(subscriber_id);
        }
    }

    /// Subscribe to the session's shutdown event; a re-used subscriber id
    /// replaces its previous channel.
    pub fn subscribe_shutdown(
        &self,
        subscriber_id: &str,
        sender: mpsc::UnboundedSender<SessionShutdown>,
    ) {
        self.shutdown_subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .insert(subscriber_id.to_string(), sender);
    }

    pub fn unsubscribe_shutdown(&self, subscriber_id: &str) {
        self.shutdown_subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .remove(subscriber_id);
    }

    /// Close the session: disconnect owned connectors, detach pooled ones,
    /// emit the shutdown event exactly once. Idempotent.
    pub async fn close(&self, reason: ShutdownReason) -> GatewayResult<()> {
        let connectors = {
            let mut inner = self.inner.lock().await;
            if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                return Ok(());
            }
            inner.state = SessionState::Closing;
            std::mem::take(&mut inner.connectors)
        };

        for attached in connectors {
            if attached.pooled {
                // The pool owns its lifetime; just drop our handle
                continue;
            }
            if let Err(err) = attached.connector.disconnect().await {
                tracing::warn!(
                    session = %self.id,
                    namespace = %attached.namespace,
                    error = %err,
                    "owned connector failed to disconnect"
                );
            }
        }

        self.emit_shutdown(reason);

        self.inner.lock().await.state = SessionState::Closed;
        tracing::info!(session = %self.id, ?reason, "session closed");
        Ok(())
    }

    fn emit_shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        let event = SessionShutdown {
            session_id: self.id,
            reason,
        };
        let mut subscribers = self
            .shutdown_subscribers
            .lock()
            .expect("subscriber lock poisoned");
        subscribers.retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    /// Start the idle monitor. Runs once per session, beginning when the
    /// session enters `Ready`. Holds only a weak handle so an abandoned
    /// session can drop.
    fn start_idle_monitor(self: &Arc<Self>) {
        if self.monitor_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(self);
        let idle_timeout = self.config.idle_timeout;
        let check_interval = self.config.idle_check_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // first tick completes immediately

            loop {
                interval.tick().await;
                let Some(session) = weak.upgrade() else {
                    break;
                };

                let idle_for = {
                    let inner = session.inner.lock().await;
                    if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                        break;
                    }
                    inner.last_activity.elapsed()
                };

                if idle_for >= idle_timeout {
                    tracing::info!(
                        session = %session.id,
                        idle_for = ?idle_for,
                        "idle threshold crossed; shutting session down"
                    );
                    let _ = session.close(ShutdownReason::IdleTimeout).await;
                    break;
                }
            }
        });
    }
}
