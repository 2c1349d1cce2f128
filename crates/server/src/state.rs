//! Application state
//!
//! Shared across all handlers. The session registry and the STT pool are
//! the only process-local mutable state; everything else is a handle over
//! the coordination or persistence stores.

use std::sync::Arc;

use outdial_config::Settings;
use outdial_coordination::{Coordinator, SlotManager};
use outdial_dialer::{CallOrchestrator, CampaignDispatcher};
use outdial_llm::ChatBackend;
use outdial_persistence::PersistenceLayer;
use outdial_pipeline::stt::PooledStt;
use outdial_pipeline::ConnectionPool;
use outdial_rag::Retriever;
use outdial_session::{CallTerminator, SessionRegistry};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub persistence: PersistenceLayer,
    pub coordinator: Coordinator,
    pub slots: SlotManager,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub orchestrator: Arc<CallOrchestrator>,
    pub registry: Arc<SessionRegistry>,
    pub stt_pool: Arc<ConnectionPool<PooledStt>>,
    pub llm: Arc<dyn ChatBackend>,
    pub retriever: Option<Arc<dyn Retriever>>,
}

impl AppState {
    /// The orchestrator doubles as the voice session's terminal hook
    pub fn terminator(&self) -> Arc<dyn CallTerminator> {
        Arc::clone(&self.orchestrator) as Arc<dyn CallTerminator>
    }

    /// Websocket base for the call-flow response
    pub fn stream_url(&self, session_id: &str) -> String {
        let base = self
            .settings
            .server
            .public_base_url
            .replace("https://", "wss://")
            .replace("http://", "ws://");
        format!("{}/voice/{}", base, session_id)
    }
}
