// Auraluxe Engine — Conversational Agent
// The shopping assistant's turn loop: plan → (approve) → execute → plan…
// until the planner answers without a tool call.
//
// One turn at a time per agent: submissions while busy are rejected. A turn
// is supervised by a watchdog (warning, then a grace period before it is
// stopped) and by the agent's CancelSignal; either one drops the in-flight
// planning future, which aborts the underlying network call.

mod helpers;
mod planner;
mod prompt;

pub use helpers::{
    ALREADY_FILLED_MESSAGE, AUTO_PROCEED_MESSAGE, CHECKOUT_READY_MESSAGE, ERROR_MESSAGE, ONE_AT_A_TIME_MESSAGE,
    REJECTED_MESSAGE, REPEATING_MESSAGE, TIMEOUT_STOP_MESSAGE, TIMEOUT_WARNING_MESSAGE,
};
pub use planner::{ExecutedTool, PlanRequest, Planner};
pub use prompt::system_prompt;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{CatalogStore, ConversationStore, PageController, ShopperStore};
use crate::engine::cascade::InferenceCascade;
use crate::engine::config::AgentSettings;
use crate::engine::state::CancelSignal;
use crate::engine::tool_executor::ToolExecutor;
use crate::engine::types::*;
use async_trait::async_trait;
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ── Public types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Idle,
    AwaitingInference,
    AwaitingApproval,
    ExecutingTool,
}

/// Progress notifications for a front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    Phase { phase: AgentPhase },
    Message { text: String },
    ToolProposed { call: PendingToolCall },
    ToolResult { name: String, result: Value },
    Warning { text: String },
}

/// How a submitted turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply(String),
    NeedsApproval { message: String, call: PendingToolCall },
    Cancelled,
    TimedOut(String),
}

/// Transcripts held in memory only.
#[derive(Default)]
pub struct MemoryConversations {
    conversations: Mutex<HashMap<String, StoredConversation>>,
}

#[async_trait]
impl ConversationStore for MemoryConversations {
    async fn load(&self, conversation_id: &str) -> EngineResult<StoredConversation> {
        Ok(self.conversations.lock().get(conversation_id).cloned().unwrap_or_default())
    }

    async fn save(&self, conversation_id: &str, conversation: &StoredConversation) -> EngineResult<()> {
        self.conversations.lock().insert(conversation_id.to_string(), conversation.clone());
        Ok(())
    }
}

// ── Builder ────────────────────────────────────────────────────────────────

pub struct AgentBuilder {
    cascade: Arc<InferenceCascade>,
    catalog: Arc<dyn CatalogStore>,
    shoppers: Arc<dyn ShopperStore>,
    page: Arc<dyn PageController>,
    conversations: Option<Arc<dyn ConversationStore>>,
    settings: AgentSettings,
    timeouts: Option<(Duration, Duration)>,
    conversation_id: String,
    user_id: Option<String>,
    ops_mode: bool,
}

impl AgentBuilder {
    pub fn conversations(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the watchdog (warning delay, then grace period).
    pub fn timeouts(mut self, warn_after: Duration, grace: Duration) -> Self {
        self.timeouts = Some((warn_after, grace));
        self
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = id.into();
        self
    }

    pub fn user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn ops_mode(mut self, enabled: bool) -> Self {
        self.ops_mode = enabled;
        self
    }

    pub fn build(self) -> ConversationalAgent {
        let (warn_after, grace) = self.timeouts.unwrap_or((self.settings.warn_after(), self.settings.grace()));
        ConversationalAgent {
            planner: Planner::new(self.cascade, self.catalog.clone(), self.shoppers.clone(), self.settings.clone()),
            executor: ToolExecutor::new(self.catalog, self.shoppers, self.page),
            conversations: self.conversations.unwrap_or_else(|| Arc::new(MemoryConversations::default())),
            settings: self.settings,
            warn_after,
            grace,
            conversation_id: self.conversation_id,
            user_id: self.user_id,
            ops_mode: AtomicBool::new(self.ops_mode),
            busy: AtomicBool::new(false),
            phase: Mutex::new(AgentPhase::Idle),
            pending: Mutex::new(None),
            cancel: CancelSignal::new(),
            events: None,
        }
    }
}

// ── Agent ──────────────────────────────────────────────────────────────────

pub struct ConversationalAgent {
    planner: Planner,
    executor: ToolExecutor,
    conversations: Arc<dyn ConversationStore>,
    settings: AgentSettings,
    warn_after: Duration,
    grace: Duration,
    conversation_id: String,
    user_id: Option<String>,
    ops_mode: AtomicBool,
    busy: AtomicBool,
    phase: Mutex<AgentPhase>,
    pending: Mutex<Option<PendingToolCall>>,
    cancel: CancelSignal,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

/// Clears the busy flag when a turn ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ConversationalAgent {
    pub fn builder(
        cascade: Arc<InferenceCascade>,
        catalog: Arc<dyn CatalogStore>,
        shoppers: Arc<dyn ShopperStore>,
        page: Arc<dyn PageController>,
    ) -> AgentBuilder {
        AgentBuilder {
            cascade,
            catalog,
            shoppers,
            page,
            conversations: None,
            settings: AgentSettings::default(),
            timeouts: None,
            conversation_id: "default".into(),
            user_id: None,
            ops_mode: false,
        }
    }

    pub fn set_events(&mut self, tx: mpsc::UnboundedSender<AgentEvent>) {
        self.events = Some(tx);
    }

    pub fn phase(&self) -> AgentPhase {
        *self.phase.lock()
    }

    pub fn pending_call(&self) -> Option<PendingToolCall> {
        self.pending.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn set_ops_mode(&self, enabled: bool) {
        self.ops_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn ops_mode(&self) -> bool {
        self.ops_mode.load(Ordering::SeqCst)
    }

    /// Handle for cancelling the current turn from another task.
    pub fn cancel_handle(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Abort the turn in flight, if any.
    pub fn cancel(&self) {
        info!("[agent] cancel requested for {}", self.conversation_id);
        self.cancel.cancel();
    }

    pub async fn transcript(&self) -> EngineResult<Vec<ChatTurn>> {
        Ok(self.conversations.load(&self.conversation_id).await?.turns)
    }

    pub async fn always_allow(&self) -> EngineResult<bool> {
        Ok(self.conversations.load(&self.conversation_id).await?.always_allow)
    }

    /// Persisted per conversation: when on, proposed tools run without approval.
    pub async fn set_always_allow(&self, enabled: bool) -> EngineResult<()> {
        let mut convo = self.conversations.load(&self.conversation_id).await?;
        convo.always_allow = enabled;
        self.conversations.save(&self.conversation_id, &convo).await
    }

    // ── Turn entry points ──────────────────────────────────────────────

    /// Send a user message and run until a reply, an approval request,
    /// cancellation or the watchdog ends the turn.
    pub async fn submit(&self, text: &str) -> EngineResult<TurnOutcome> {
        if text.trim().is_empty() {
            return Err(EngineError::Other("empty message".into()));
        }
        let _guard = self.begin()?;
        // A new message supersedes any call still awaiting approval.
        if let Some(stale) = self.pending.lock().take() {
            info!("[agent] dropping unapproved {} for new message", stale.function);
        }
        let mut convo = self.conversations.load(&self.conversation_id).await?;
        convo.turns.push(ChatTurn::user(text));
        self.save(convo).await?;
        self.supervise(self.drive(None)).await
    }

    /// Execute the pending tool call and continue the turn.
    pub async fn approve(&self) -> EngineResult<TurnOutcome> {
        let _guard = self.begin()?;
        let call = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| EngineError::Other("no tool call is awaiting approval".into()))?;
        self.supervise(async {
            let executed = self.execute(&call).await;
            self.drive(Some(executed)).await
        })
        .await
    }

    /// Decline the pending tool call.
    pub async fn reject(&self) -> EngineResult<TurnOutcome> {
        let _guard = self.begin()?;
        if self.pending.lock().take().is_none() {
            return Err(EngineError::Other("no tool call is awaiting approval".into()));
        }
        self.record_assistant(REJECTED_MESSAGE).await?;
        self.set_phase(AgentPhase::Idle);
        Ok(TurnOutcome::Reply(REJECTED_MESSAGE.into()))
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn begin(&self) -> EngineResult<BusyGuard<'_>> {
        if self.busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(EngineError::Busy("a turn is already in progress".into()));
        }
        self.cancel.reset();
        Ok(BusyGuard(&self.busy))
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn set_phase(&self, phase: AgentPhase) {
        *self.phase.lock() = phase;
        self.emit(AgentEvent::Phase { phase });
    }

    async fn save(&self, mut convo: StoredConversation) -> EngineResult<()> {
        let keep = self.settings.stored_turns;
        if convo.turns.len() > keep {
            let excess = convo.turns.len() - keep;
            convo.turns.drain(..excess);
        }
        self.conversations.save(&self.conversation_id, &convo).await
    }

    async fn record_assistant(&self, text: &str) -> EngineResult<()> {
        let mut convo = self.conversations.load(&self.conversation_id).await?;
        convo.turns.push(ChatTurn::assistant(text));
        self.save(convo).await?;
        self.emit(AgentEvent::Message { text: text.to_string() });
        Ok(())
    }

    /// Race the turn against cancellation and the watchdog.
    async fn supervise<F>(&self, turn: F) -> EngineResult<TurnOutcome>
    where
        F: Future<Output = EngineResult<TurnOutcome>>,
    {
        let watchdog = async {
            tokio::time::sleep(self.warn_after).await;
            warn!("[agent] turn running for {:?}, warning user", self.warn_after);
            self.emit(AgentEvent::Warning { text: TIMEOUT_WARNING_MESSAGE.into() });
            tokio::time::sleep(self.grace).await;
        };

        let outcome = tokio::select! {
            result = turn => result,
            _ = self.cancel.cancelled() => {
                info!("[agent] turn cancelled");
                self.pending.lock().take();
                Ok(TurnOutcome::Cancelled)
            }
            _ = watchdog => {
                warn!("[agent] turn stopped by watchdog");
                self.pending.lock().take();
                self.record_assistant(TIMEOUT_STOP_MESSAGE).await?;
                Ok(TurnOutcome::TimedOut(TIMEOUT_STOP_MESSAGE.into()))
            }
        };

        let phase = match &outcome {
            Ok(TurnOutcome::NeedsApproval { .. }) => AgentPhase::AwaitingApproval,
            _ => AgentPhase::Idle,
        };
        self.set_phase(phase);
        outcome
    }

    async fn execute(&self, call: &PendingToolCall) -> ExecutedTool {
        self.set_phase(AgentPhase::ExecutingTool);
        let result = self.executor.execute(call, self.user_id.as_deref(), self.ops_mode()).await;
        self.emit(AgentEvent::ToolResult { name: call.function.clone(), result: result.clone() });
        ExecutedTool { name: call.function.clone(), arguments: call.arguments.clone(), result }
    }

    /// Plan, and keep executing auto-approved tools until the planner
    /// answers in prose or a tool needs approval.
    async fn drive(&self, mut executed: Option<ExecutedTool>) -> EngineResult<TurnOutcome> {
        let max_rounds = self.settings.max_rounds;
        let mut round = 0;

        loop {
            round += 1;
            if round > max_rounds {
                warn!("[agent] max tool rounds ({}) reached, stopping", max_rounds);
                let text = format!(
                    "I ran {} actions in a row without finishing. Let me know how you'd like to continue.",
                    max_rounds
                );
                if let Some(ex) = executed.take() {
                    let mut convo = self.conversations.load(&self.conversation_id).await?;
                    convo.turns.push(ChatTurn::function(ex.name, ex.arguments, &ex.result));
                    self.save(convo).await?;
                }
                self.record_assistant(&text).await?;
                return Ok(TurnOutcome::Reply(text));
            }

            self.set_phase(AgentPhase::AwaitingInference);
            let mut convo = self.conversations.load(&self.conversation_id).await?;
            let path = self.executor.page().current_path();
            let reply = self
                .planner
                .respond(&PlanRequest {
                    turns: &convo.turns,
                    user_id: self.user_id.as_deref(),
                    executed: executed.as_ref(),
                    ops_mode: self.ops_mode(),
                    current_path: &path,
                })
                .await;

            if let Some(ex) = executed.take() {
                convo.turns.push(ChatTurn::function(ex.name, ex.arguments, &ex.result));
            }

            let Some(call) = reply.tool_call().cloned() else {
                convo.turns.push(ChatTurn::assistant(reply.message.clone()));
                self.save(convo).await?;
                self.emit(AgentEvent::Message { text: reply.message.clone() });
                return Ok(TurnOutcome::Reply(reply.message));
            };

            let always_allow = convo.always_allow;
            self.save(convo).await?;
            self.emit(AgentEvent::ToolProposed { call: call.clone() });

            if always_allow {
                info!("[agent] auto-approving {} (round {})", call.function, round);
                executed = Some(self.execute(&call).await);
                continue;
            }

            *self.pending.lock() = Some(call.clone());
            return Ok(TurnOutcome::NeedsApproval { message: reply.message, call });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::page::SimulatedPage;
    use crate::engine::sessions::SessionStore;
    use crate::engine::test_support::{cascade_of, item, ScriptedProvider};
    use serde_json::json;

    fn agent(provider: ScriptedProvider, path: &str) -> (ConversationalAgent, Arc<SimulatedPage>) {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.upsert_item(&item("a", "Aurora Ring", "rings", "gold", 120.0, None)).unwrap();
        let page = Arc::new(SimulatedPage::new(path));
        let agent = ConversationalAgent::builder(Arc::new(cascade_of(vec![provider])), store.clone(), store, page.clone())
            .user_id(Some("u1".into()))
            .ops_mode(true)
            .build();
        (agent, page)
    }

    #[tokio::test]
    async fn plain_reply_is_recorded() {
        let (agent, _) = agent(ScriptedProvider::new("openai").reply_text("Hi there!"), "/");
        let outcome = agent.submit("hello").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Reply("Hi there!".into()));
        let turns = agent.transcript().await.unwrap();
        assert_eq!(turns, vec![ChatTurn::user("hello"), ChatTurn::assistant("Hi there!")]);
        assert_eq!(agent.phase(), AgentPhase::Idle);
    }

    #[tokio::test]
    async fn tool_needs_approval_then_runs() {
        let provider = ScriptedProvider::new("openai")
            .reply_tools("Let me add that.", vec![("add_to_cart", json!({"product_id": "a"}))])
            .reply_text("Added the Aurora Ring to your cart.");
        let (agent, _) = agent(provider, "/shop");

        let outcome = agent.submit("add the aurora ring").await.unwrap();
        match outcome {
            TurnOutcome::NeedsApproval { message, call } => {
                assert_eq!(message, "Let me add that.");
                assert_eq!(call.function, "add_to_cart");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(agent.phase(), AgentPhase::AwaitingApproval);

        let done = agent.approve().await.unwrap();
        assert_eq!(done, TurnOutcome::Reply("Added the Aurora Ring to your cart.".into()));
        let turns = agent.transcript().await.unwrap();
        assert!(turns.iter().any(|t| t.is_function("add_to_cart") && t.result_value()["success"] == true));
    }

    #[tokio::test]
    async fn reject_clears_pending() {
        let provider = ScriptedProvider::new("openai").reply_tools("", vec![("check_cart", json!({}))]);
        let (agent, _) = agent(provider, "/");
        agent.submit("what's in my cart").await.unwrap();
        assert_eq!(agent.reject().await.unwrap(), TurnOutcome::Reply(REJECTED_MESSAGE.into()));
        assert!(agent.pending_call().is_none());
        assert!(agent.approve().await.is_err());
    }

    #[tokio::test]
    async fn new_message_drops_unapproved_call() {
        let provider = ScriptedProvider::new("openai")
            .reply_tools("", vec![("navigate_to_page", json!({"path": "/cart"}))])
            .reply_text("Sure, what else?");
        let (agent, page) = agent(provider, "/");

        let first = agent.submit("open my cart").await.unwrap();
        assert!(matches!(first, TurnOutcome::NeedsApproval { .. }));
        let second = agent.submit("actually, never mind").await.unwrap();
        assert_eq!(second, TurnOutcome::Reply("Sure, what else?".into()));

        assert_eq!(agent.phase(), AgentPhase::Idle);
        assert!(agent.pending_call().is_none());
        assert!(agent.approve().await.is_err());
        assert_eq!(page.current_path(), "/");
    }

    #[tokio::test]
    async fn always_allow_runs_tools_automatically() {
        let provider = ScriptedProvider::new("openai")
            .reply_tools("", vec![("navigate_to_page", json!({"path": "/cart"}))])
            .reply_text("You're on the cart page.");
        let (agent, page) = agent(provider, "/");
        agent.set_always_allow(true).await.unwrap();

        let outcome = agent.submit("open my cart").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Reply("You're on the cart page.".into()));
        assert_eq!(page.current_path(), "/cart");
    }

    #[tokio::test]
    async fn checkout_autofill_proceeds_without_new_input() {
        let provider = ScriptedProvider::new("openai")
            .reply_tools("", vec![("autofill_form", json!({"name": "Ava", "city": "Austin"}))])
            .reply_text("Which delivery method would you like?");
        let calls = provider.call_count();
        let (agent, _) = agent(provider, "/checkout");
        agent.set_always_allow(true).await.unwrap();

        agent.submit("fill in my details").await.unwrap();
        let turns = agent.transcript().await.unwrap();
        let names: Vec<&str> = turns.iter().filter_map(|t| t.name.as_deref()).collect();
        assert_eq!(names, vec!["autofill_form", "get_page_state"]);
        // autofill → get_page_state happened without a model call in between.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_submit_while_busy_is_rejected() {
        let provider = ScriptedProvider::new("openai").reply_text("slow").with_delay(Duration::from_millis(200));
        let (agent, _) = agent(provider, "/");
        let agent = Arc::new(agent);
        let first = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.submit("one").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(agent.submit("two").await, Err(EngineError::Busy(_))));
        assert_eq!(first.await.unwrap().unwrap(), TurnOutcome::Reply("slow".into()));
    }

    #[tokio::test]
    async fn cancel_aborts_inflight_call() {
        let provider = ScriptedProvider::new("openai").reply_text("late").with_delay(Duration::from_secs(10));
        let (agent, _) = agent(provider, "/");
        let agent = Arc::new(agent);
        let handle = agent.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(2), agent.submit("hi")).await.unwrap().unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(!agent.is_busy());
    }

    #[tokio::test]
    async fn watchdog_warns_then_stops() {
        let provider = ScriptedProvider::new("openai").reply_text("late").with_delay(Duration::from_secs(10));
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut agent = ConversationalAgent::builder(
            Arc::new(cascade_of(vec![provider])),
            store.clone(),
            store,
            Arc::new(SimulatedPage::new("/")),
        )
        .timeouts(Duration::from_millis(50), Duration::from_millis(50))
        .build();
        agent.set_events(tx);

        let outcome = agent.submit("hi").await.unwrap();
        assert_eq!(outcome, TurnOutcome::TimedOut(TIMEOUT_STOP_MESSAGE.into()));

        let mut warned = false;
        while let Ok(event) = rx.try_recv() {
            warned |= event == AgentEvent::Warning { text: TIMEOUT_WARNING_MESSAGE.into() };
        }
        assert!(warned);
        let turns = agent.transcript().await.unwrap();
        assert_eq!(turns.last().unwrap().content, TIMEOUT_STOP_MESSAGE);
    }

    #[tokio::test]
    async fn transcript_is_capped() {
        let mut provider = ScriptedProvider::new("openai");
        for _ in 0..3 {
            provider = provider.reply_text("ok");
        }
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        let mut settings = AgentSettings::default();
        settings.stored_turns = 4;
        let agent = ConversationalAgent::builder(
            Arc::new(cascade_of(vec![provider])),
            store.clone(),
            store,
            Arc::new(SimulatedPage::new("/")),
        )
        .settings(settings)
        .build();
        for i in 0..3 {
            agent.submit(&format!("msg {}", i)).await.unwrap();
        }
        let turns = agent.transcript().await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "msg 1");
    }
}
