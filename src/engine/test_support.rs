// Shared fixtures for unit tests: a scripted provider and catalog items.

use crate::atoms::error::EngineResult;
use crate::atoms::traits::{AiProvider, Embedder, ProviderError};
use crate::engine::cascade::{CascadeSlot, FailureMemory, InferenceCascade};
use crate::engine::providers::AnyProvider;
use crate::engine::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider that replays queued completions in order and records every
/// request. An exhausted script answers with a 500.
pub struct ScriptedProvider {
    name: String,
    replies: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        ScriptedProvider {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            requests: Arc::new(Mutex::new(vec![])),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    pub fn reply_text(self, text: &str) -> Self {
        self.replies.lock().push_back(Ok(Completion { text: text.into(), ..Default::default() }));
        self
    }

    pub fn reply_tools(self, text: &str, calls: Vec<(&str, Value)>) -> Self {
        let tool_calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                id: format!("call_{}", i),
                call_type: "function".into(),
                function: FunctionCall { name: name.into(), arguments: args.to_string() },
            })
            .collect();
        self.replies.lock().push_back(Ok(Completion { text: text.into(), tool_calls, model: None }));
        self
    }

    pub fn fail(self, error: ProviderError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        self.requests.clone()
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| Err(ProviderError::Api { status: 500, message: "script exhausted".into() }))
    }
}

/// Embedder returning one fixed vector, or always failing.
pub struct FixedEmbedder {
    vector: Option<Vec<f32>>,
}

impl FixedEmbedder {
    pub fn ok(vector: Vec<f32>) -> Self {
        FixedEmbedder { vector: Some(vector) }
    }

    pub fn failing() -> Self {
        FixedEmbedder { vector: None }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> EngineResult<Vec<f32>> {
        self.vector.clone().ok_or_else(|| "embedding endpoint unavailable".into())
    }
}

/// Cascade over scripted providers with private failure memory and no
/// rate-limit pause.
pub fn cascade_of(providers: Vec<ScriptedProvider>) -> InferenceCascade {
    let slots = providers.into_iter().map(|p| CascadeSlot::new(AnyProvider::new(p), "", "")).collect();
    InferenceCascade::new(slots)
        .with_memory(Arc::new(FailureMemory::new()))
        .with_rate_limit_wait(Duration::ZERO)
}

pub fn item(id: &str, name: &str, category: &str, material: &str, price: f64, image: Option<&str>) -> CatalogItem {
    CatalogItem {
        id: id.into(),
        name: name.into(),
        category: category.into(),
        material: material.into(),
        price,
        description: None,
        image_urls: image.map(|u| vec![u.to_string()]).unwrap_or_default(),
        video_url: None,
        image_360_url: None,
        stock: 5,
    }
}
