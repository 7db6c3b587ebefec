// ── Auraluxe Atoms: Trait Seams ────────────────────────────────────────────
// Every external collaborator the engine talks to is a trait here:
// inference providers, the embedding endpoint, the catalog/shopper/
// conversation stores, the live page and the batch event sink.
// Implementations live in engine/ (HTTP, SQLite, simulated page) or in tests.

use crate::atoms::error::EngineResult;
use crate::atoms::types::*;
use async_trait::async_trait;
use thiserror::Error;

// ── Inference providers ────────────────────────────────────────────────────

/// Wire-level provider failure. The cascade inspects the variant to decide
/// whether to pause before the next provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("auth: {0}")]
    Auth(String),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("api {status}: {message}")]
    Api { status: u16, message: String },
    /// The provider answered but the payload was unusable (bad JSON, empty).
    #[error("parse: {0}")]
    Parse(String),
}

impl ProviderError {
    /// 429s and anything whose message says "rate limit".
    pub fn is_rate_limit(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status: 429, .. } => true,
            other => other.to_string().to_lowercase().contains("rate limit"),
        }
    }
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Stable identifier used for logging and failure memory (`gemini`, `groq`…).
    fn name(&self) -> &str;
    fn kind(&self) -> ProviderKind;
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

// ── Embeddings ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>>;
}

// ── Data stores ────────────────────────────────────────────────────────────

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_item(&self, id: &str) -> EngineResult<Option<CatalogItem>>;
    async fn list_items(&self, limit: usize) -> EngineResult<Vec<CatalogItem>>;
    /// Items for the given ids, in the order of `ids`; unknown ids are skipped.
    async fn items_by_ids(&self, ids: &[String]) -> EngineResult<Vec<CatalogItem>>;
    async fn search_items(
        &self,
        query: &str,
        min_price: Option<f64>,
        max_price: Option<f64>,
        limit: usize,
    ) -> EngineResult<Vec<CatalogItem>>;
    /// Nearest-neighbour search over successful analyses, best first.
    async fn match_by_style(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> EngineResult<Vec<StyleMatch>>;
    /// Insert-or-update keyed by (product_id, image_url).
    async fn upsert_analysis(&self, record: &AnalysisRecord) -> EngineResult<()>;
    async fn analyses_for(&self, product_ids: &[String]) -> EngineResult<Vec<AnalysisRecord>>;
}

#[async_trait]
pub trait ShopperStore: Send + Sync {
    async fn user_context(&self, user_id: &str) -> EngineResult<UserContext>;
    async fn cart_line(&self, user_id: &str, product_id: &str) -> EngineResult<Option<CartLine>>;
    async fn insert_cart_line(&self, user_id: &str, product_id: &str, quantity: i64) -> EngineResult<()>;
    async fn set_cart_quantity(&self, line_id: &str, quantity: i64) -> EngineResult<()>;
    async fn cart_lines(&self, user_id: &str) -> EngineResult<Vec<CartLine>>;
    /// Replace the behaviour row for the record's identity (user id, else session id).
    async fn upsert_behavior(&self, record: &BehaviorRecord) -> EngineResult<()>;
    async fn similar_behaviors(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> EngineResult<Vec<BehaviorRecord>>;
}

/// Pluggable transcript + preference storage.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> EngineResult<StoredConversation>;
    async fn save(&self, conversation_id: &str, conversation: &StoredConversation) -> EngineResult<()>;
}

// ── Live page ──────────────────────────────────────────────────────────────

/// The rendered page the agent manipulates. `Ok(false)` means the selector
/// matched nothing.
#[async_trait]
pub trait PageController: Send + Sync {
    fn current_path(&self) -> String;
    async fn navigate(&self, path: &str) -> EngineResult<()>;
    async fn click(&self, selector: &str) -> EngineResult<bool>;
    async fn fill(&self, selector: &str, value: &str) -> EngineResult<bool>;
    async fn scroll(&self, selector: &str) -> EngineResult<bool>;
    async fn introspect(&self) -> EngineResult<PageSnapshot>;
}

// ── Batch stream ───────────────────────────────────────────────────────────

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: BatchEvent) -> EngineResult<()>;
}
