// Auraluxe Engine — Batch Processing Pipeline
//
// Walks a worklist of catalog items strictly in order: vision analysis via
// the cascade → composite embedding (with fallback) → upsert of the
// (item, first image) analysis row. Every item ends `success` or `failed`;
// one item's failure never stops the run. Progress is streamed through an
// EventSink as log / progress / complete events.
//
// Cancellation is cooperative: it is checked between items (including
// during the inter-item pause); an item already in flight finishes.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{CatalogStore, Embedder, EventSink, ProviderError};
use crate::engine::cascade::{embed_with_fallback, AttemptObserver, InferenceCascade};
use crate::engine::config::BatchSettings;
use crate::engine::state::CancelSignal;
use crate::engine::types::*;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub struct BatchPipeline {
    cascade: Arc<InferenceCascade>,
    embedder: Arc<dyn Embedder>,
    catalog: Arc<dyn CatalogStore>,
    item_delay: Duration,
    embed_timeout: Duration,
}

/// Forwards cascade attempts to the stream as log lines.
struct StreamObserver<'a> {
    sink: &'a dyn EventSink,
}

#[async_trait]
impl<'a> AttemptObserver for StreamObserver<'a> {
    async fn on_attempt(&self, provider: &str, attempt: usize) {
        let pct = (30 + 5 * attempt).min(55) as u8;
        emit(self.sink, BatchEvent::log(format!("  → Analyzing with {}...", provider.to_uppercase()), Some(pct))).await;
    }

    async fn on_success(&self, _provider: &str) {
        emit(self.sink, BatchEvent::log("  ✓ Analysis complete", Some(60))).await;
    }

    async fn on_failure(&self, provider: &str, _error: &ProviderError) {
        emit(self.sink, BatchEvent::log(format!("  ✗ {} failed, trying next...", provider), None)).await;
    }
}

/// Sink that only writes to the log (single-item processing).
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn emit(&self, event: BatchEvent) -> EngineResult<()> {
        if let BatchEvent::Log { log, .. } = event {
            info!("[batch] {}", log.trim());
        }
        Ok(())
    }
}

/// Emit, logging (not propagating) sink failures. Returns false when the
/// event could not be delivered.
async fn emit(sink: &dyn EventSink, event: BatchEvent) -> bool {
    match sink.emit(event).await {
        Ok(()) => true,
        Err(e) => {
            warn!("[batch] event not delivered: {}", e);
            false
        }
    }
}

/// `"{name} {category} {material} {description} {style} {metal_type}"`
pub fn embedding_text(item: &CatalogItem, analysis: &VisualAnalysis) -> String {
    format!(
        "{} {} {} {} {} {}",
        item.name,
        item.category,
        item.material,
        analysis.description.as_deref().unwrap_or(""),
        analysis.style.as_deref().unwrap_or(""),
        analysis.metal_type.as_deref().unwrap_or("")
    )
}

impl BatchPipeline {
    pub fn new(
        cascade: Arc<InferenceCascade>,
        embedder: Arc<dyn Embedder>,
        catalog: Arc<dyn CatalogStore>,
        settings: &BatchSettings,
        embed_timeout: Duration,
    ) -> Self {
        BatchPipeline {
            cascade,
            embedder,
            catalog,
            item_delay: Duration::from_millis(settings.item_delay_ms),
            embed_timeout,
        }
    }

    /// Process `item_ids` and stream events to `sink`. The returned summary
    /// is the same one sent as the final `complete` event.
    pub async fn run(&self, item_ids: &[String], sink: &dyn EventSink, cancel: &CancelSignal) -> BatchSummary {
        let items = match self.catalog.items_by_ids(item_ids).await {
            Ok(items) => items.into_iter().filter(|i| i.primary_image().is_some()).collect::<Vec<_>>(),
            Err(e) => {
                error!("[batch] loading worklist failed: {}", e);
                let summary = BatchSummary::Failed { error: "Failed to batch process".into() };
                emit(sink, BatchEvent::complete(summary.clone())).await;
                return summary;
            }
        };

        if items.is_empty() {
            let summary = BatchSummary::Empty { message: "No products to process".into() };
            emit(sink, BatchEvent::complete(summary.clone())).await;
            return summary;
        }

        let total = items.len();
        info!("[batch] Processing {} items", total);
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.item_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                info!("[batch] Cancelled before item {}/{}", idx + 1, total);
                cancelled = true;
                break;
            }

            let outcome = self.process_item(item, idx + 1, total, sink).await;
            results.push(outcome.clone());
            if !emit(sink, BatchEvent::progress(outcome)).await {
                // Nobody is listening any more.
                cancelled = true;
                break;
            }
        }

        let summary = BatchSummary::Finished {
            message: format!("Processed {} products", results.len()),
            total,
            results,
            cancelled,
        };
        emit(sink, BatchEvent::complete(summary.clone())).await;
        summary
    }

    /// Run the per-item pipeline for one product without streaming.
    pub async fn process_one(&self, item_id: &str) -> EngineResult<ItemOutcome> {
        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| EngineError::Other(format!("Product {} not found", item_id)))?;
        if item.primary_image().is_none() {
            return Err(EngineError::Other(format!("{} has no image", item.name)));
        }
        Ok(self.process_item(&item, 1, 1, &LogSink).await)
    }

    async fn process_item(&self, item: &CatalogItem, position: usize, total: usize, sink: &dyn EventSink) -> ItemOutcome {
        emit(sink, BatchEvent::log(format!("[{}/{}] {}", position, total, item.name), Some(0))).await;

        match self.analyze_and_store(item, sink).await {
            Ok(()) => {
                emit(sink, BatchEvent::log("  ✓ Complete", Some(100))).await;
                info!("[batch] Saved analysis for {}", item.name);
                ItemOutcome::ok(item)
            }
            Err(e) => {
                let message = match e {
                    EngineError::Other(m) => m,
                    other => other.to_string(),
                };
                error!("[batch] Failed to process {}: {}", item.name, message);
                emit(sink, BatchEvent::log(format!("  ✗ Failed: {}", message), Some(0))).await;
                emit(sink, BatchEvent::log("  → Marking as failed...", None)).await;

                let record = AnalysisRecord {
                    product_id: item.id.clone(),
                    image_url: item.primary_image().unwrap_or_default().to_string(),
                    embedding: None,
                    visual_analysis: None,
                    status: AnalysisStatus::Failed,
                    error_message: Some(message.clone()),
                    updated_at: chrono::Utc::now().to_rfc3339(),
                };
                if let Err(db) = self.catalog.upsert_analysis(&record).await {
                    error!("[batch] Could not mark {} as failed: {}", item.name, db);
                }
                ItemOutcome::failed(item, message)
            }
        }
    }

    async fn analyze_and_store(&self, item: &CatalogItem, sink: &dyn EventSink) -> EngineResult<()> {
        let image_url = item.primary_image().unwrap_or_default().to_string();
        emit(sink, BatchEvent::log("  → Fetching image...", Some(10))).await;
        emit(sink, BatchEvent::log("  → Starting AI analysis...", Some(20))).await;

        let analysis = self.cascade.run_vision_analysis(item, &StreamObserver { sink }).await?;

        emit(sink, BatchEvent::log("  → Generating embeddings...", Some(70))).await;
        let text = embedding_text(item, &analysis);
        let (embedding, used_fallback) = embed_with_fallback(self.embedder.as_ref(), &text, self.embed_timeout).await;
        if used_fallback {
            emit(sink, BatchEvent::log("  ⚠ Using fallback embeddings", None)).await;
        } else {
            emit(sink, BatchEvent::log("  ✓ Embeddings generated", Some(85))).await;
        }

        emit(sink, BatchEvent::log("  → Saving to database...", Some(90))).await;
        let record = AnalysisRecord {
            product_id: item.id.clone(),
            image_url,
            embedding: Some(embedding),
            visual_analysis: Some(analysis),
            status: AnalysisStatus::Success,
            error_message: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        self.catalog
            .upsert_analysis(&record)
            .await
            .map_err(|e| EngineError::Other(format!("DB Insert failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::{AiProvider, CatalogStore};
    use crate::engine::cascade::{CascadeSlot, FailureMemory};
    use crate::engine::events::ChannelSink;
    use crate::engine::providers::AnyProvider;
    use crate::engine::sessions::SessionStore;

    /// Fails for any request that mentions `poison`, answers JSON otherwise.
    struct Picky {
        name: &'static str,
        poison: &'static str,
    }

    #[async_trait]
    impl AiProvider for Picky {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom
        }
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
            let text: String = request.messages.iter().map(|m| m.content.as_text()).collect();
            if text.contains(self.poison) {
                return Err(ProviderError::Api { status: 500, message: "model down".into() });
            }
            Ok(Completion { text: r#"{"style":"classic","metal_type":"gold","description":"shiny"}"#.into(), ..Default::default() })
        }
    }

    struct Offline;

    #[async_trait]
    impl Embedder for Offline {
        async fn embed(&self, _text: &str) -> EngineResult<Vec<f32>> {
            Err(EngineError::Other("offline".into()))
        }
    }

    fn item(id: &str, name: &str, images: &[&str]) -> CatalogItem {
        CatalogItem {
            id: id.into(),
            name: name.into(),
            category: "rings".into(),
            material: "gold".into(),
            price: 100.0,
            description: None,
            image_urls: images.iter().map(|s| s.to_string()).collect(),
            video_url: None,
            image_360_url: None,
            stock: 1,
        }
    }

    fn pipeline(store: Arc<SessionStore>) -> BatchPipeline {
        let cascade = InferenceCascade::new(vec![
            CascadeSlot::new(AnyProvider::new(Picky { name: "gemini", poison: "Broken" }), "", ""),
            CascadeSlot::new(AnyProvider::new(Picky { name: "groq", poison: "Broken" }), "", ""),
        ])
        .with_memory(Arc::new(FailureMemory::new()));
        BatchPipeline::new(
            Arc::new(cascade),
            Arc::new(Offline),
            store,
            &BatchSettings { item_delay_ms: 0 },
            Duration::from_secs(1),
        )
    }

    async fn drain(mut rx: tokio::sync::mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut events = vec![];
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn failures_are_isolated_and_persisted() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("a", "Aurora", &["a.jpg"])).unwrap();
        store.upsert_item(&item("b", "Broken Band", &["b.jpg"])).unwrap();
        store.upsert_item(&item("c", "Celeste", &["c.jpg"])).unwrap();

        let (sink, rx) = ChannelSink::new();
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let summary = pipeline(store.clone()).run(&ids, &sink, &CancelSignal::new()).await;

        let events = drain(rx).await;
        let progress: Vec<&ItemOutcome> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { progress } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress.iter().filter(|p| p.success).count(), 2);
        assert_eq!(progress[1].product_id, "b");
        assert!(matches!(events.last(), Some(BatchEvent::Complete { .. })));
        assert!(matches!(summary, BatchSummary::Finished { total: 3, .. }));
        assert!(events.contains(&BatchEvent::log("  ⚠ Using fallback embeddings", None)));

        let rows = store.analyses_for(&ids).await.unwrap();
        let statuses: Vec<AnalysisStatus> = rows.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![AnalysisStatus::Success, AnalysisStatus::Failed, AnalysisStatus::Success]);
        assert!(rows[1].error_message.as_deref().unwrap_or_default().contains("model down"));
    }

    #[tokio::test]
    async fn attempts_are_logged_with_sub_progress() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("a", "Aurora", &["a.jpg"])).unwrap();

        let (sink, rx) = ChannelSink::new();
        pipeline(store).run(&["a".to_string()], &sink, &CancelSignal::new()).await;
        let events = drain(rx).await;
        assert_eq!(events[0], BatchEvent::log("[1/1] Aurora", Some(0)));
        assert!(events.contains(&BatchEvent::log("  → Analyzing with GEMINI...", Some(35))));
        assert!(events.contains(&BatchEvent::log("  ✓ Analysis complete", Some(60))));
    }

    #[tokio::test]
    async fn empty_worklist_and_imageless_items() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("x", "No Image", &[])).unwrap();

        let (sink, rx) = ChannelSink::new();
        let summary = pipeline(store).run(&["x".to_string()], &sink, &CancelSignal::new()).await;
        assert_eq!(summary, BatchSummary::Empty { message: "No products to process".into() });
        assert_eq!(drain(rx).await.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_remaining_items() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("a", "Aurora", &["a.jpg"])).unwrap();
        store.upsert_item(&item("c", "Celeste", &["c.jpg"])).unwrap();

        let cancel = CancelSignal::new();
        cancel.cancel();
        let (sink, _rx) = ChannelSink::new();
        let summary = pipeline(store).run(&["a".to_string(), "c".to_string()], &sink, &cancel).await;
        match summary {
            BatchSummary::Finished { results, cancelled, total, .. } => {
                assert!(results.is_empty());
                assert!(cancelled);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected summary {:?}", other),
        }
    }

    /// Records events and cancels the run on the first progress event.
    struct CancelOnProgress {
        cancel: CancelSignal,
        events: parking_lot::Mutex<Vec<BatchEvent>>,
    }

    #[async_trait]
    impl EventSink for CancelOnProgress {
        async fn emit(&self, event: BatchEvent) -> EngineResult<()> {
            if matches!(event, BatchEvent::Progress { .. }) {
                self.cancel.cancel();
            }
            self.events.lock().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancelling_mid_run_skips_unstarted_items() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("a", "Aurora", &["a.jpg"])).unwrap();
        store.upsert_item(&item("b", "Bella", &["b.jpg"])).unwrap();
        store.upsert_item(&item("c", "Celeste", &["c.jpg"])).unwrap();

        let cancel = CancelSignal::new();
        let sink = CancelOnProgress { cancel: cancel.clone(), events: parking_lot::Mutex::new(vec![]) };
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let summary = pipeline(store.clone()).run(&ids, &sink, &cancel).await;

        let events = sink.events.lock();
        let progress = events.iter().filter(|e| matches!(e, BatchEvent::Progress { .. })).count();
        assert_eq!(progress, 1);
        assert!(matches!(events.last(), Some(BatchEvent::Complete { .. })));
        match summary {
            BatchSummary::Finished { results, cancelled, total, .. } => {
                assert!(cancelled);
                assert_eq!(total, 3);
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].product_id, "a");
            }
            other => panic!("unexpected summary {:?}", other),
        }
        assert_eq!(store.analyses_for(&ids).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn process_one_reports_outcome() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("a", "Aurora", &["a.jpg"])).unwrap();
        let outcome = pipeline(store).process_one("a").await.unwrap();
        assert!(outcome.success);
    }
}
