// ── Auraluxe Atoms: Pure Data Types ───────────────────────────────────────────
// All plain struct/enum definitions with no logic.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.
//
// These types are re-exported from engine/types.rs via
//   pub use crate::atoms::types::*;
// so engine modules import everything from one place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Providers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model used for text/tool-calling completions.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Vision-capable model used for image analysis.
    #[serde(default)]
    pub vision_model: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Google,
    Groq,
    Custom,
}

// ── Messages ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    /// Legacy function-result role; carries the tool name in `Message::name`.
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlData {
    /// `https://…` reference or inline `data:<mime>;base64,<payload>` URL.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String, // JSON string
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One non-streaming completion request, independent of the wire format.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    /// Empty means "use the provider slot's configured model".
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// The actual model that responded (from the API, not config).
    pub model: Option<String>,
}

// ── Catalog ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub material: String,
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub image_360_url: Option<String>,
    #[serde(default)]
    pub stock: i64,
}

/// Structured visual attributes produced by the vision cascade.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisualAnalysis {
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    #[serde(default)]
    pub metal_type: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub formality: Option<String>,
    #[serde(default)]
    pub suitable_skin_tones: Vec<String>,
    #[serde(default)]
    pub design_elements: Vec<String>,
    #[serde(default)]
    pub occasion: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Success,
    Failed,
}

/// Persisted analysis row, unique per (product_id, image_url).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub product_id: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_analysis: Option<VisualAnalysis>,
    pub status: AnalysisStatus,
    pub error_message: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleMatch {
    pub product_id: String,
    pub similarity: f64,
}

// ── Shoppers ───────────────────────────────────────────────────────────────

/// Client-held activity aggregate (ids only; details are resolved on demand).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorSignal {
    #[serde(default)]
    pub viewed: Vec<String>,
    #[serde(default)]
    pub favorites: Vec<String>,
    #[serde(default)]
    pub cart: Vec<String>,
    #[serde(default)]
    pub searches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub name: Option<String>,
    pub cart: Vec<CartLine>,
    pub favorites: Vec<CatalogItem>,
    pub total_orders: i64,
}

/// One persisted behaviour summary; superseded on every capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub user_name: Option<String>,
    pub user_location: Option<String>,
    pub interaction_summary: String,
    pub behavior_data: Value,
    pub preferences: Value,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

// ── Conversation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    /// Tool name for `function` turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A proposed tool invocation awaiting approval. Wire shape matches the
/// agent endpoint: `{id, function, arguments}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub function: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Response of one planning step of the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentReply {
    pub message: String,
    #[serde(rename = "toolCalls", default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<PendingToolCall>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredConversation {
    #[serde(default)]
    pub turns: Vec<ChatTurn>,
    #[serde(default)]
    pub always_allow: bool,
}

// ── Page controller ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageField {
    /// Input type (`text`, `email`, `tel`, `textarea`, `select`, `radio`…).
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageOption {
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageSnapshot {
    pub path: String,
    pub buttons: Vec<String>,
    pub fields: Vec<PageField>,
    pub options: Vec<PageOption>,
    pub headings: Vec<String>,
}

// ── Batch stream ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemOutcome {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BatchSummary {
    Finished {
        message: String,
        total: usize,
        results: Vec<ItemOutcome>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        cancelled: bool,
    },
    Failed {
        error: String,
    },
    Empty {
        message: String,
    },
}

/// One NDJSON line of the batch stream. Exactly one of `log`, `progress`,
/// `complete` is present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BatchEvent {
    Log {
        log: String,
        #[serde(rename = "subProgress", default, skip_serializing_if = "Option::is_none")]
        sub_progress: Option<u8>,
    },
    Progress {
        progress: ItemOutcome,
    },
    Complete {
        complete: BatchSummary,
    },
}
