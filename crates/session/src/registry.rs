//! Process-wide registry of live voice sessions
//!
//! Keyed by gateway stream/session id. The registry and the STT pool are
//! the only process-local shared mutable state; both have explicit
//! init/teardown owned by the server.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::session::InboundEvent;

/// Write side of one live session's inbound feed
#[derive(Clone)]
pub struct SessionHandle {
    inbound_tx: mpsc::Sender<InboundEvent>,
}

impl SessionHandle {
    pub fn new(inbound_tx: mpsc::Sender<InboundEvent>) -> Self {
        Self { inbound_tx }
    }

    pub async fn send_audio(&self, pcm: Vec<u8>) -> bool {
        self.inbound_tx.send(InboundEvent::Audio(pcm)).await.is_ok()
    }

    /// Signal stream close; the session runs its terminal cleanup
    pub async fn stop(&self) {
        let _ = self.inbound_tx.send(InboundEvent::Stopped).await;
    }
}

/// In-memory session registry
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: impl Into<String>, handle: SessionHandle) {
        let session_id = session_id.into();
        tracing::debug!(session_id = %session_id, "Session registered");
        self.sessions.insert(session_id, handle);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Stop every live session (graceful shutdown, campaign purge)
    pub async fn stop_all(&self) {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handle in handles {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);

        registry.insert("s1", SessionHandle::new(tx));
        assert_eq!(registry.count(), 1);

        let handle = registry.get("s1").unwrap();
        assert!(handle.send_audio(vec![0u8; 320]).await);
        assert!(matches!(rx.recv().await, Some(InboundEvent::Audio(_))));

        handle.stop().await;
        assert!(matches!(rx.recv().await, Some(InboundEvent::Stopped)));

        registry.remove("s1");
        assert_eq!(registry.count(), 0);
        assert!(registry.get("s1").is_none());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let registry = SessionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);
        registry.insert("a", SessionHandle::new(tx1));
        registry.insert("b", SessionHandle::new(tx2));

        registry.stop_all().await;
        assert!(matches!(rx1.recv().await, Some(InboundEvent::Stopped)));
        assert!(matches!(rx2.recv().await, Some(InboundEvent::Stopped)));
    }
}
