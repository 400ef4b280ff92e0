//! Session registry
//!
//! Tracks live sessions by id, enforces the concurrent-session limit, and
//! reaps entries when a session announces its own shutdown (idle timeout
//! included), so the map never accumulates closed sessions.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use bundlemux_mcp::{Session, ShutdownReason};

use crate::error::ApiError;

/// Registry of live client sessions.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether another session may be created right now.
    pub async fn at_capacity(&self) -> bool {
        self.sessions.read().await.len() >= self.max_sessions
    }

    /// Register a session and arrange for its removal on shutdown.
    pub async fn insert(&self, session: Arc<Session>) -> Result<(), ApiError> {
        {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= self.max_sessions {
                return Err(ApiError::CapacityExhausted);
            }
            sessions.insert(session.id(), session.clone());
        }

        // Reap the map entry when the session shuts itself down
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.subscribe_shutdown("session-manager", tx);
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            if let Some(event) = rx.recv().await {
                sessions.write().await.remove(&event.session_id);
                tracing::debug!(session = %event.session_id, reason = ?event.reason, "session reaped");
            }
        });

        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Close and drop one session. Returns whether it existed.
    pub async fn close(&self, id: &Uuid) -> bool {
        let session = self.sessions.write().await.remove(id);
        match session {
            Some(session) => {
                let _ = session.close(ShutdownReason::Explicit).await;
                true
            }
            None => false,
        }
    }

    /// Close every live session (server shutdown).
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> =
            self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in drained {
            let _ = session.close(ShutdownReason::Explicit).await;
        }
    }
}
