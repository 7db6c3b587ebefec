// engine/state.rs — Shared engine state and cooperative cancellation.
// EngineState is the composition root: it owns the store, the cascade and
// the embedding client and hands out the per-task components wired to them.

use crate::atoms::error::EngineResult;
use crate::atoms::traits::{CatalogStore, ConversationStore, Embedder, PageController, ShopperStore};
use crate::engine::agent_loop::{AgentEvent, ConversationalAgent};
use crate::engine::batch::BatchPipeline;
use crate::engine::behavior::BehaviorTracker;
use crate::engine::cascade::InferenceCascade;
use crate::engine::config::EngineConfig;
use crate::engine::embedding::EmbeddingClient;
use crate::engine::recommend::Recommender;
use crate::engine::scoring::ScoringEngine;
use crate::engine::sessions::SessionStore;
use crate::engine::stylist::Stylist;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

// ── Cancellation ───────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a caller and a running task.
/// Cheap to clone; all clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before starting a new request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Resolves once `cancel` has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ── Engine state ───────────────────────────────────────────────────────────

pub struct EngineState {
    pub config: EngineConfig,
    pub store: Arc<SessionStore>,
    pub cascade: Arc<InferenceCascade>,
    pub embedder: Arc<EmbeddingClient>,
}

impl EngineState {
    /// Open the configured database and build the provider cascade.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let store = SessionStore::open(&config.database_path())?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: EngineConfig, store: Arc<SessionStore>) -> Self {
        let cascade = Arc::new(config.build_cascade());
        let embedder = Arc::new(EmbeddingClient::new(&config.embedding));
        info!("[engine] State ready: providers={:?}", cascade.provider_names());
        EngineState { config, store, cascade, embedder }
    }

    fn catalog(&self) -> Arc<dyn CatalogStore> {
        self.store.clone()
    }

    fn shoppers(&self) -> Arc<dyn ShopperStore> {
        self.store.clone()
    }

    fn dyn_embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn batch_pipeline(&self) -> BatchPipeline {
        BatchPipeline::new(
            self.cascade.clone(),
            self.dyn_embedder(),
            self.catalog(),
            &self.config.batch,
            self.embedder.timeout(),
        )
    }

    pub fn scoring(&self) -> ScoringEngine {
        ScoringEngine::new(self.config.scoring.clone())
    }

    pub fn recommender(&self) -> Recommender {
        Recommender::new(self.cascade.clone(), self.catalog(), self.scoring())
    }

    pub fn stylist(&self) -> Stylist {
        Stylist::new(self.cascade.clone(), self.dyn_embedder(), self.catalog())
    }

    pub fn behavior_tracker(&self) -> BehaviorTracker {
        BehaviorTracker::new(self.dyn_embedder(), self.shoppers(), self.embedder.timeout())
    }

    /// A conversational agent for one conversation, driving `page`.
    pub fn agent(
        &self,
        conversation_id: impl Into<String>,
        user_id: Option<String>,
        page: Arc<dyn PageController>,
        events: Option<mpsc::UnboundedSender<AgentEvent>>,
    ) -> ConversationalAgent {
        let conversations: Arc<dyn ConversationStore> = self.store.clone();
        let mut agent = ConversationalAgent::builder(self.cascade.clone(), self.catalog(), self.shoppers(), page)
            .conversations(conversations)
            .settings(self.config.agent.clone())
            .conversation_id(conversation_id)
            .user_id(user_id)
            .build();
        if let Some(tx) = events {
            agent.set_events(tx);
        }
        agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_returns_immediately() {
        let signal = CancelSignal::new();
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled()).await.unwrap();
        signal.reset();
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn state_wires_components_from_config() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        let state = EngineState::with_store(EngineConfig::default(), store);
        assert_eq!(state.scoring().weights().limit, state.config.scoring.limit);
        let _ = state.batch_pipeline();
        let _ = state.recommender();
    }
}
