//! Per-client rate limiting for the MCP ingress
//!
//! Sliding-window limiter keyed by client IP. State for idle clients is
//! pruned opportunistically on every check, so no background task is
//! needed at gateway request volumes.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,

    /// Time window duration
    pub window_duration: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_duration: Duration::from_secs(60),
        }
    }
}

/// Sliding-window rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Request timestamps per client key
    states: RwLock<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request for `key`, failing when the window is full.
    pub async fn check(&self, key: &str) -> Result<(), ApiError> {
        let now = Instant::now();
        let window_start = now - self.config.window_duration;
        let mut states = self.states.write().await;

        // Prune fully-idle clients while we hold the lock anyway
        states.retain(|_, timestamps| {
            timestamps.last().map(|last| *last >= window_start).unwrap_or(false)
        });

        let timestamps = states.entry(key.to_string()).or_default();
        timestamps.retain(|timestamp| *timestamp >= window_start);

        if timestamps.len() as u32 >= self.config.max_requests {
            let retry_after = timestamps
                .first()
                .map(|oldest| {
                    (*oldest + self.config.window_duration).saturating_duration_since(now)
                })
                .unwrap_or(Duration::from_secs(1));
            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        timestamps.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_fills_and_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window_duration: Duration::from_secs(60),
        });

        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(matches!(
            limiter.check("10.0.0.1").await,
            Err(ApiError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_clients_are_isolated() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_duration: Duration::from_secs(60),
        });

        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(limiter.check("10.0.0.1").await.is_err());
        assert!(limiter.check("10.0.0.2").await.is_ok());
    }
}
