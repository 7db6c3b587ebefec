// Auraluxe Engine — Inference Cascade
//
// Tries interchangeable providers strictly one after another for a single
// logical task (vision analysis, chat completion) until one succeeds.
//
// Ordering: providers that did not fail last time go first (configured
// order), the last-failed provider goes last. A rate-limited failure pauses
// before the next provider. A response whose payload cannot be parsed counts
// as a failure of that provider.

use crate::atoms::constants::{
    EMBEDDING_DIMENSIONS, FALLBACK_EMBEDDING_SCALE, RATE_LIMIT_WAIT_MS, VISION_MAX_TOKENS,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{AiProvider, Embedder, ProviderError};
use crate::engine::providers::AnyProvider;
use crate::engine::types::*;
use async_trait::async_trait;
use log::{info, warn};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const VISION_SYSTEM_PROMPT: &str = "Analyze jewelry image. Return JSON with: dominant_colors, metal_type, style, formality, suitable_skin_tones, design_elements, occasion, description.";

static FENCE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"```json\n?|```").ok());

static SHARED_MEMORY: LazyLock<Arc<FailureMemory>> = LazyLock::new(|| Arc::new(FailureMemory::new()));

// ── Failure memory ─────────────────────────────────────────────────────────

/// Which provider failed most recently. Best-effort: concurrent cascades may
/// overwrite each other, which only affects ordering.
#[derive(Debug, Default)]
pub struct FailureMemory {
    last_failed: Mutex<Option<String>>,
}

impl FailureMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance used when a cascade is not given its own.
    pub fn shared() -> Arc<FailureMemory> {
        SHARED_MEMORY.clone()
    }

    pub fn last_failed(&self) -> Option<String> {
        self.last_failed.lock().clone()
    }

    pub fn record_failure(&self, provider: &str) {
        *self.last_failed.lock() = Some(provider.to_string());
    }

    pub fn clear(&self) {
        *self.last_failed.lock() = None;
    }
}

// ── Attempt observer ───────────────────────────────────────────────────────

/// Hook for callers that report cascade progress (the batch pipeline logs
/// every attempt). `attempt` is 1-based.
#[async_trait]
pub trait AttemptObserver: Send + Sync {
    async fn on_attempt(&self, _provider: &str, _attempt: usize) {}
    async fn on_success(&self, _provider: &str) {}
    async fn on_failure(&self, _provider: &str, _error: &ProviderError) {}
}

pub struct NoopObserver;

#[async_trait]
impl AttemptObserver for NoopObserver {}

// ── Slots ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Vision,
    Chat,
}

/// One provider in the cascade with the models it uses per task kind.
/// An empty model falls back to the provider's configured default.
pub struct CascadeSlot {
    pub provider: AnyProvider,
    pub chat_model: String,
    pub vision_model: String,
}

impl CascadeSlot {
    pub fn new(provider: AnyProvider, chat_model: impl Into<String>, vision_model: impl Into<String>) -> Self {
        CascadeSlot { provider, chat_model: chat_model.into(), vision_model: vision_model.into() }
    }

    fn model_for(&self, kind: TaskKind) -> &str {
        match kind {
            TaskKind::Vision => &self.vision_model,
            TaskKind::Chat => &self.chat_model,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

// ── Cascade ────────────────────────────────────────────────────────────────

pub struct InferenceCascade {
    slots: Vec<CascadeSlot>,
    memory: Arc<FailureMemory>,
    rate_limit_wait: Duration,
}

impl InferenceCascade {
    pub fn new(slots: Vec<CascadeSlot>) -> Self {
        InferenceCascade {
            slots,
            memory: FailureMemory::shared(),
            rate_limit_wait: Duration::from_millis(RATE_LIMIT_WAIT_MS),
        }
    }

    pub fn with_memory(mut self, memory: Arc<FailureMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    pub fn memory(&self) -> &Arc<FailureMemory> {
        &self.memory
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.provider.name().to_string()).collect()
    }

    /// Slots for the next run: everything except the last failure in
    /// configured order, then the last failure.
    fn ordered_slots(&self) -> Vec<&CascadeSlot> {
        let failed = self.memory.last_failed();
        let (mut order, demoted): (Vec<&CascadeSlot>, Vec<&CascadeSlot>) = self
            .slots
            .iter()
            .partition(|s| failed.as_deref() != Some(s.provider.name()));
        order.extend(demoted);
        order
    }

    /// Run one logical task through the cascade. `parse` turns a raw
    /// completion into the task's result; a parse error escalates to the next
    /// provider like any other failure.
    pub async fn run<T, F>(
        &self,
        kind: TaskKind,
        request: CompletionRequest,
        observer: &dyn AttemptObserver,
        parse: F,
    ) -> EngineResult<T>
    where
        T: Send,
        F: Fn(Completion) -> Result<T, ProviderError> + Send + Sync,
    {
        let order = self.ordered_slots();
        if order.is_empty() {
            return Err(EngineError::Config("no inference providers configured".into()));
        }

        let total = order.len();
        for (idx, slot) in order.into_iter().enumerate() {
            let name = slot.provider.name().to_string();
            observer.on_attempt(&name, idx + 1).await;

            let mut attempt_request = request.clone();
            attempt_request.model = slot.model_for(kind).to_string();

            let outcome = match slot.provider.complete(&attempt_request).await {
                Ok(completion) => parse(completion),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    self.memory.clear();
                    observer.on_success(&name).await;
                    info!("[cascade] {:?} task served by {}", kind, name);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("[cascade] {} failed: {}", name, e);
                    self.memory.record_failure(&name);
                    observer.on_failure(&name, &e).await;

                    if e.is_rate_limit() {
                        tokio::time::sleep(self.rate_limit_wait).await;
                    }
                    if idx + 1 == total {
                        return Err(EngineError::provider(name, e.to_string()));
                    }
                }
            }
        }

        Err(EngineError::Other("inference cascade exhausted".into()))
    }

    /// Structured visual attributes for an item's first image.
    pub async fn run_vision_analysis(
        &self,
        item: &CatalogItem,
        observer: &dyn AttemptObserver,
    ) -> EngineResult<VisualAnalysis> {
        let image = item
            .primary_image()
            .ok_or_else(|| EngineError::Other(format!("{} has no image", item.name)))?;
        let request = CompletionRequest {
            messages: vec![
                Message::system(VISION_SYSTEM_PROMPT),
                Message::user_with_image(format!("{} - {}", item.name, item.category), image),
            ],
            max_tokens: Some(VISION_MAX_TOKENS),
            ..Default::default()
        };
        self.run(TaskKind::Vision, request, observer, |completion| {
            let value = extract_json(&completion.text)?;
            VisualAnalysis::from_value(&value)
                .ok_or_else(|| ProviderError::Parse("analysis is not a JSON object".into()))
        })
        .await
    }

    /// Chat completion with optional tools; the raw completion is returned.
    pub async fn run_chat_completion(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> EngineResult<Completion> {
        let request = CompletionRequest {
            messages,
            tools,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            ..Default::default()
        };
        self.run(TaskKind::Chat, request, &NoopObserver, non_empty).await
    }

    /// Free-text completion over messages that carry images.
    pub async fn run_vision_completion(&self, messages: Vec<Message>, options: ChatOptions) -> EngineResult<String> {
        let request = CompletionRequest {
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            ..Default::default()
        };
        self.run(TaskKind::Vision, request, &NoopObserver, |c| non_empty(c).map(|c| c.text)).await
    }
}

fn non_empty(completion: Completion) -> Result<Completion, ProviderError> {
    if completion.text.trim().is_empty() && completion.tool_calls.is_empty() {
        return Err(ProviderError::Parse("empty completion".into()));
    }
    Ok(completion)
}

// ── JSON extraction ────────────────────────────────────────────────────────

/// Strip ```json fences and parse the remainder.
pub fn extract_json(text: &str) -> Result<Value, ProviderError> {
    let cleaned = match FENCE_RE.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.replace("```json", "").replace("```", ""),
    };
    serde_json::from_str(cleaned.trim()).map_err(|e| ProviderError::Parse(format!("invalid JSON: {}", e)))
}

// ── Embedding fallback ─────────────────────────────────────────────────────

/// Deterministic stand-in vector: `sin(i * words) * 0.1`, where `words` is the
/// number of space-separated pieces of `text`.
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let words = text.split(' ').count() as f64;
    (0..EMBEDDING_DIMENSIONS)
        .map(|i| ((i as f64 * words).sin() * FALLBACK_EMBEDDING_SCALE) as f32)
        .collect()
}

/// Embed `text`, substituting [`fallback_embedding`] on error or timeout.
/// The flag is `true` when the fallback was used.
pub async fn embed_with_fallback(embedder: &dyn Embedder, text: &str, timeout: Duration) -> (Vec<f32>, bool) {
    match tokio::time::timeout(timeout, embedder.embed(text)).await {
        Ok(Ok(vector)) if !vector.is_empty() => (vector, false),
        Ok(Ok(_)) => {
            warn!("[embedding] empty vector returned, using fallback");
            (fallback_embedding(text), true)
        }
        Ok(Err(e)) => {
            warn!("[embedding] embedding failed, using fallback: {}", e);
            (fallback_embedding(text), true)
        }
        Err(_) => {
            warn!("[embedding] embedding timed out after {}s, using fallback", timeout.as_secs());
            (fallback_embedding(text), true)
        }
    }
}
