//! Cross-session sharing of stateless connectors
//!
//! Stateless upstreams tolerate one shared connection for every session
//! that references them. The pool keys base connectors by
//! `namespace:url`; sessions wrap their own filtered connector around the
//! shared handle, so permissions stay per-bundle while the transport is
//! shared. Pooled connectors live until process shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::UpstreamConnector;

/// Pool key for a stateless upstream.
pub fn pool_key(namespace: &str, url: &str) -> String {
    format!("{}:{}", namespace, url)
}

/// Shared map of stateless base connectors.
#[derive(Default)]
pub struct ConnectorPool {
    connectors: RwLock<HashMap<String, Arc<dyn UpstreamConnector>>>,
}

impl ConnectorPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Arc<dyn UpstreamConnector>> {
        self.connectors.read().await.get(key).cloned()
    }

    pub async fn has(&self, key: &str) -> bool {
        self.connectors.read().await.contains_key(key)
    }

    /// Publish a connector under `key`. When two sessions race, exactly one
    /// creation wins; the incumbent is returned and the caller's transient
    /// connector should be discarded (disconnected if it already
    /// connected).
    pub async fn publish(
        &self,
        key: &str,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Arc<dyn UpstreamConnector> {
        let mut connectors = self.connectors.write().await;
        match connectors.get(key) {
            Some(existing) => existing.clone(),
            None => {
                connectors.insert(key.to_string(), connector.clone());
                connector
            }
        }
    }

    /// Disconnect every pooled connector, then empty the pool.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<dyn UpstreamConnector>)> =
            self.connectors.write().await.drain().collect();

        for (key, connector) in drained {
            if let Err(err) = connector.disconnect().await {
                tracing::warn!(key = %key, error = %err, "pooled connector failed to disconnect");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.connectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connectors.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockConnector;
    use crate::connector::ConnectionState;

    #[tokio::test]
    async fn test_pool_returns_single_instance_per_key() {
        let pool = ConnectorPool::new();
        let key = pool_key("github", "http://github-mcp:3000/mcp");

        let first: Arc<dyn UpstreamConnector> = Arc::new(MockConnector::new("github"));
        let second: Arc<dyn UpstreamConnector> = Arc::new(MockConnector::new("github"));

        let published = pool.publish(&key, first.clone()).await;
        assert!(Arc::ptr_eq(&published, &first));

        // The loser of the race gets the incumbent back
        let raced = pool.publish(&key, second.clone()).await;
        assert!(Arc::ptr_eq(&raced, &first));
        assert!(!Arc::ptr_eq(&raced, &second));

        let fetched = pool.get(&key).await.unwrap();
        assert!(Arc::ptr_eq(&fetched, &first));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_differ_by_namespace_and_url() {
        let pool = ConnectorPool::new();
        pool.publish(
            &pool_key("github", "http://a/mcp"),
            Arc::new(MockConnector::new("github")),
        )
        .await;
        pool.publish(
            &pool_key("github", "http://b/mcp"),
            Arc::new(MockConnector::new("github")),
        )
        .await;
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_empties() {
        let pool = ConnectorPool::new();
        let connector = Arc::new(MockConnector::new("fs"));
        connector.connect().await.unwrap();

        pool.publish(&pool_key("fs", "http://fs/mcp"), connector.clone())
            .await;
        pool.shutdown().await;

        assert!(pool.is_empty().await);
        assert_eq!(connector.state(), ConnectionState::Disconnected);
    }
}
