// Auraluxe Engine — Core types
// Re-exports the atoms data types and adds the small behaviour that goes with
// them (constructors, text extraction, lenient analysis parsing).

pub use crate::atoms::types::*;

use serde_json::Value;

// ── Providers ──────────────────────────────────────────────────────────────

impl ProviderKind {
    pub fn default_base_url(&self) -> &str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Custom => "",
        }
    }

    /// Name used in logs and failure memory when the config id is empty.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Google => "gemini",
            ProviderKind::Groq => "groq",
            ProviderKind::Custom => "custom",
        }
    }
}

// ── Messages ───────────────────────────────────────────────────────────────

impl MessageContent {
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl Message {
    fn plain(role: Role, text: impl Into<String>) -> Self {
        Message {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    /// A user message carrying text plus one image reference.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: MessageContent::Blocks(vec![
                ContentBlock::Text { text: text.into() },
                ContentBlock::ImageUrl {
                    image_url: ImageUrlData { url: image_url.into(), detail: None },
                },
            ]),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: Role::Function,
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: Some(name.into()),
        }
    }
}

impl From<&ChatTurn> for Message {
    fn from(turn: &ChatTurn) -> Self {
        match turn.role {
            TurnRole::User => Message::user(turn.content.clone()),
            TurnRole::Assistant => Message::assistant(turn.content.clone()),
            TurnRole::Function => Message::function_result(
                turn.name.clone().unwrap_or_default(),
                turn.content.clone(),
            ),
        }
    }
}

// ── Conversation ───────────────────────────────────────────────────────────

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn { role: TurnRole::User, content: content.into(), name: None, arguments: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn { role: TurnRole::Assistant, content: content.into(), name: None, arguments: None }
    }

    /// A tool result turn; `content` is the JSON-serialized result object.
    pub fn function(name: impl Into<String>, arguments: Value, result: &Value) -> Self {
        ChatTurn {
            role: TurnRole::Function,
            content: result.to_string(),
            name: Some(name.into()),
            arguments: Some(arguments),
        }
    }

    /// Parsed result object of a function turn (`Value::Null` if unparsable).
    pub fn result_value(&self) -> Value {
        serde_json::from_str(&self.content).unwrap_or(Value::Null)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.role == TurnRole::Function && self.name.as_deref() == Some(name)
    }
}

impl AgentReply {
    pub fn message(message: impl Into<String>) -> Self {
        AgentReply { message: message.into(), tool_calls: None }
    }

    pub fn with_tool(message: impl Into<String>, call: PendingToolCall) -> Self {
        AgentReply { message: message.into(), tool_calls: Some(vec![call]) }
    }

    pub fn tool_call(&self) -> Option<&PendingToolCall> {
        self.tool_calls.as_ref().and_then(|calls| calls.first())
    }
}

// ── Catalog ────────────────────────────────────────────────────────────────

impl CatalogItem {
    pub fn primary_image(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str).filter(|u| !u.is_empty())
    }
}

impl VisualAnalysis {
    /// Build from a model's JSON object, tolerating strings where arrays are
    /// expected (and vice versa) and numeric scalars.
    pub fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let scalar = |key: &str| -> Option<String> {
            match obj.get(key)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Array(items) => {
                    let joined = items.iter().filter_map(|i| i.as_str()).collect::<Vec<_>>().join(", ");
                    (!joined.is_empty()).then_some(joined)
                }
                _ => None,
            }
        };
        let list = |key: &str| -> Vec<String> {
            match obj.get(key) {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|i| match i {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect(),
                Some(Value::String(s)) => s
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
                _ => vec![],
            }
        };
        Some(VisualAnalysis {
            dominant_colors: list("dominant_colors"),
            metal_type: scalar("metal_type"),
            style: scalar("style"),
            formality: scalar("formality"),
            suitable_skin_tones: list("suitable_skin_tones"),
            design_elements: list("design_elements"),
            occasion: list("occasion"),
            description: scalar("description"),
        })
    }
}

// ── Text helpers ───────────────────────────────────────────────────────────

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("hello", 10), "hello");
        assert_eq!(truncate_utf8("hello", 3), "hel");
        // "é" is two bytes; cutting in the middle backs off.
        assert_eq!(truncate_utf8("aé", 2), "a");
    }

    #[test]
    fn visual_analysis_tolerates_loose_shapes() {
        let v = json!({
            "dominant_colors": "gold, white",
            "metal_type": "18k gold",
            "style": ["classic", "minimal"],
            "formality": 7,
            "occasion": ["wedding", "gala"],
            "description": "  A solitaire ring  "
        });
        let a = VisualAnalysis::from_value(&v).unwrap();
        assert_eq!(a.dominant_colors, vec!["gold", "white"]);
        assert_eq!(a.style.as_deref(), Some("classic, minimal"));
        assert_eq!(a.formality.as_deref(), Some("7"));
        assert_eq!(a.description.as_deref(), Some("A solitaire ring"));
        assert!(a.design_elements.is_empty());
    }

    #[test]
    fn visual_analysis_rejects_non_objects() {
        assert!(VisualAnalysis::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn function_turn_round_trips_result() {
        let turn = ChatTurn::function("click_element", json!({"selector": "#a"}), &json!({"success": true, "clicked": "#a"}));
        assert!(turn.is_function("click_element"));
        assert_eq!(turn.result_value()["clicked"], "#a");
        let msg = Message::from(&turn);
        assert_eq!(msg.role, Role::Function);
        assert_eq!(msg.name.as_deref(), Some("click_element"));
    }

    #[test]
    fn agent_reply_wire_shape() {
        let reply = AgentReply::with_tool(
            "Executing...",
            PendingToolCall { id: "c1".into(), function: "check_cart".into(), arguments: json!({}) },
        );
        let v = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["toolCalls"][0]["function"], "check_cart");
        let plain = serde_json::to_value(AgentReply::message("hi")).unwrap();
        assert!(plain.get("toolCalls").is_none());
    }
}
