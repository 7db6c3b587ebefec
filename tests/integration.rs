// End-to-end scenarios over an in-memory store and scripted providers.

use async_trait::async_trait;
use auraluxe_engine::atoms::traits::{AiProvider, CatalogStore, Embedder, ProviderError};
use auraluxe_engine::engine::agent_loop::{ConversationalAgent, TurnOutcome};
use auraluxe_engine::engine::batch::BatchPipeline;
use auraluxe_engine::engine::cascade::{CascadeSlot, FailureMemory, InferenceCascade};
use auraluxe_engine::engine::config::BatchSettings;
use auraluxe_engine::engine::events::ChannelSink;
use auraluxe_engine::engine::page::SimulatedPage;
use auraluxe_engine::engine::providers::AnyProvider;
use auraluxe_engine::engine::scoring::{ScoringEngine, ScoringSignal};
use auraluxe_engine::engine::sessions::SessionStore;
use auraluxe_engine::engine::types::*;
use auraluxe_engine::{CancelSignal, EngineResult};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Fixtures ───────────────────────────────────────────────────────────────

type Rule = Box<dyn Fn(usize, &CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync>;

/// Provider answering through a closure of (call index, request).
struct RuleProvider {
    name: String,
    calls: Arc<AtomicUsize>,
    rule: Rule,
}

impl RuleProvider {
    fn new(name: &str, rule: Rule) -> Self {
        RuleProvider { name: name.into(), calls: Arc::new(AtomicUsize::new(0)), rule }
    }
}

#[async_trait]
impl AiProvider for RuleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.rule)(n, request)
    }
}

struct UnitEmbedder;

#[async_trait]
impl Embedder for UnitEmbedder {
    async fn embed(&self, _text: &str) -> EngineResult<Vec<f32>> {
        Ok(vec![0.6, 0.8])
    }
}

fn cascade(providers: Vec<RuleProvider>) -> Arc<InferenceCascade> {
    let slots = providers.into_iter().map(|p| CascadeSlot::new(AnyProvider::new(p), "", "")).collect();
    Arc::new(
        InferenceCascade::new(slots)
            .with_memory(Arc::new(FailureMemory::new()))
            .with_rate_limit_wait(Duration::ZERO),
    )
}

fn item(id: &str, name: &str, category: &str, material: &str, price: f64, image: Option<&str>) -> CatalogItem {
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
        stock: 10,
    }
}

fn text(s: &str) -> Completion {
    Completion { text: s.into(), ..Default::default() }
}

// ── Scenario A: instant scoring ───────────────────────────────────────────

#[test]
fn scenario_a_similar_ring_outranks_bracelet() {
    let viewed = vec![item("ringA", "Ring A", "ring", "gold", 500.0, None)];
    let candidates = vec![
        item("braceletC", "Bracelet C", "bracelet", "silver", 500.0, None),
        item("ringB", "Ring B", "ring", "gold", 520.0, None),
    ];
    let ranked = ScoringEngine::default().rank(&candidates, &ScoringSignal { viewed: &viewed, favorites: &[], cart: &[] });
    let ids: Vec<&str> = ranked.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["ringB", "braceletC"]);
}

// ── Scenario B: batch with one item failing everywhere ─────────────────────

#[tokio::test]
async fn scenario_b_batch_reports_each_item_once() {
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    store.upsert_item(&item("p1", "Aurora Ring", "rings", "gold", 100.0, Some("https://img/1.jpg"))).unwrap();
    store.upsert_item(&item("p2", "Broken Brooch", "brooches", "silver", 80.0, Some("https://img/2.jpg"))).unwrap();
    store.upsert_item(&item("p3", "Cleo Chain", "necklaces", "gold", 60.0, Some("https://img/3.jpg"))).unwrap();

    let analysis = json!({
        "dominant_colors": ["gold"],
        "metal_type": "gold",
        "style": "classic",
        "formality": "formal",
        "suitable_skin_tones": ["warm"],
        "design_elements": ["band"],
        "occasion": ["evening"],
        "description": "A polished piece."
    })
    .to_string();
    let providers = ["gemini", "groq", "openai"]
        .into_iter()
        .map(|name| {
            let analysis = analysis.clone();
            RuleProvider::new(
                name,
                Box::new(move |_: usize, req: &CompletionRequest| -> Result<Completion, ProviderError> {
                    let asked = req.messages.iter().map(|m| m.content.as_text()).collect::<String>();
                    if asked.contains("Broken Brooch") {
                        Err(ProviderError::Api { status: 500, message: "image unreadable".into() })
                    } else {
                        Ok(text(&format!("```json\n{}\n```", analysis)))
                    }
                }),
            )
        })
        .collect();

    let pipeline = BatchPipeline::new(
        cascade(providers),
        Arc::new(UnitEmbedder),
        store.clone(),
        &BatchSettings { item_delay_ms: 0 },
        Duration::from_secs(1),
    );
    let (sink, mut rx) = ChannelSink::new();
    let ids: Vec<String> = ["p1", "p2", "p3"].iter().map(|s| s.to_string()).collect();
    pipeline.run(&ids, &sink, &CancelSignal::new()).await;
    drop(sink);

    let mut progress = vec![];
    let mut completes = vec![];
    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::Progress { progress: p } => progress.push(p),
            BatchEvent::Complete { complete } => completes.push(complete),
            BatchEvent::Log { .. } => {}
        }
    }

    assert_eq!(progress.len(), 3);
    assert_eq!(progress.iter().filter(|p| !p.success).count(), 1);
    assert_eq!(progress[1].product_id, "p2");
    assert!(!progress[1].success);
    assert_eq!(completes.len(), 1);
    match &completes[0] {
        BatchSummary::Finished { total, results, .. } => {
            assert_eq!(*total, 3);
            assert_eq!(results.len(), 3);
        }
        other => panic!("unexpected summary {:?}", other),
    }

    let stored = store.analyses_for(&ids).await.unwrap();
    let failed: Vec<&str> =
        stored.iter().filter(|r| r.status == AnalysisStatus::Failed).map(|r| r.product_id.as_str()).collect();
    assert_eq!(failed, vec!["p2"]);
}

// ── Scenario C: checkout autofill proceeds on its own ──────────────────────

#[tokio::test]
async fn scenario_c_autofill_then_page_state_without_user_input() {
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    store.upsert_item(&item("a", "Aurora Ring", "rings", "gold", 120.0, None)).unwrap();

    let provider = RuleProvider::new(
        "openai",
        Box::new(|n: usize, _req: &CompletionRequest| -> Result<Completion, ProviderError> {
            match n {
                0 => Ok(Completion {
                    text: String::new(),
                    tool_calls: vec![ToolCall {
                        id: "call_1".into(),
                        call_type: "function".into(),
                        function: FunctionCall {
                            name: "autofill_form".into(),
                            arguments: json!({
                                "name": "Ava Stone",
                                "email": "ava@example.com",
                                "address": "1 Main St",
                                "city": "Austin",
                                "state": "TX",
                                "zip": "78701",
                                "phone": "555-0100"
                            })
                            .to_string(),
                        },
                    }],
                    model: None,
                }),
                _ => Ok(text("Which delivery method would you like: Standard, Express or Overnight?")),
            }
        }),
    );
    let calls = provider.calls.clone();
    let page = Arc::new(SimulatedPage::new("/checkout"));
    let agent = ConversationalAgent::builder(cascade(vec![provider]), store.clone(), store.clone(), page.clone())
        .conversations(store.clone())
        .conversation_id("checkout-1")
        .user_id(Some("u1".into()))
        .ops_mode(true)
        .build();

    let first = agent.submit("Please fill in my checkout details").await.unwrap();
    let call = match first {
        TurnOutcome::NeedsApproval { call, .. } => call,
        other => panic!("expected approval request, got {:?}", other),
    };
    assert_eq!(call.function, "autofill_form");

    // One approval runs autofill; get_page_state follows without a new
    // user message and, being auto-proposed, waits for approval too.
    let second = agent.approve().await.unwrap();
    match second {
        TurnOutcome::NeedsApproval { call, .. } => {
            assert_eq!(call.function, "get_page_state");
            assert_eq!(call.id, "auto_proceed");
        }
        other => panic!("expected get_page_state, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(page.value_of("#city").as_deref(), Some("Austin"));
    assert_eq!(page.value_of("#country").as_deref(), Some("United States"));

    let third = agent.approve().await.unwrap();
    assert_eq!(
        third,
        TurnOutcome::Reply("Which delivery method would you like: Standard, Express or Overnight?".into())
    );

    let transcript = agent.transcript().await.unwrap();
    let tools: Vec<&str> = transcript.iter().filter_map(|t| t.name.as_deref()).collect();
    assert_eq!(tools, vec!["autofill_form", "get_page_state"]);
    let state = transcript[2].result_value();
    assert_eq!(state["allFieldsFilled"], true);
}
