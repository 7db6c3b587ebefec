// agent_loop/helpers.rs — Guards applied around each planning step.
//
// Self-contained checks that short-circuit the model: the checkout
// auto-proceed and stop rules, duplicate fills and repeated tool loops.
// All of them look only at the transcript window, never at the page.

use crate::engine::types::*;
use serde_json::{json, Value};

use super::planner::ExecutedTool;

// ── Fixed replies ──────────────────────────────────────────────────────

pub const AUTO_PROCEED_MESSAGE: &str = "All fields filled! Checking delivery and payment options...";
pub const AUTO_PROCEED_CALL_ID: &str = "auto_proceed";
pub const CHECKOUT_READY_MESSAGE: &str =
    "Delivery and payment methods selected! Ready to complete your order? Please confirm to proceed with checkout.";
pub const ONE_AT_A_TIME_MESSAGE: &str = "Executing one action at a time...";
pub const ALREADY_FILLED_MESSAGE: &str =
    "I already filled that field. Moving to next field or let me know what else to fill.";
pub const REPEATING_MESSAGE: &str = "I seem to be repeating myself. What would you like me to do next?";
pub const EXECUTING_MESSAGE: &str = "Executing...";
pub const REJECTED_MESSAGE: &str = "No problem! Let me know if you need anything else.";
pub const ERROR_MESSAGE: &str = "Sorry, I encountered an error.";
pub const TIMEOUT_WARNING_MESSAGE: &str =
    "I've been working for 3 minutes. Should I continue? (I'll stop in 2 minutes if no response)";
pub const TIMEOUT_STOP_MESSAGE: &str = "Task stopped after 5 minutes. Let me know if you need help!";

const CHECKOUT_PATH: &str = "/checkout";
const DELIVERY_WORDS: &[&str] = &["delivery", "standard", "express", "overnight"];
const PAYMENT_WORDS: &[&str] = &["payment", "credit", "paypal", "cash"];

// ── Checkout rules ─────────────────────────────────────────────────────

/// A successful `autofill_form` on the checkout page goes straight to
/// `get_page_state` without asking the model.
pub fn auto_proceed(current_path: &str, executed: &ExecutedTool) -> Option<AgentReply> {
    let succeeded = executed.result["success"].as_bool().unwrap_or(false);
    (current_path == CHECKOUT_PATH && executed.name == "autofill_form" && succeeded).then(|| {
        AgentReply::with_tool(
            AUTO_PROCEED_MESSAGE,
            PendingToolCall { id: AUTO_PROCEED_CALL_ID.into(), function: "get_page_state".into(), arguments: json!({}) },
        )
    })
}

/// Whether a delivery click and a payment click appear among the
/// `click_element` results in `window`.
pub fn checkout_selections(window: &[ChatTurn]) -> (bool, bool) {
    let clicked: Vec<String> = window
        .iter()
        .filter(|t| t.is_function("click_element"))
        .filter_map(|t| t.result_value()["clicked"].as_str().map(str::to_lowercase))
        .collect();
    let seen = |words: &[&str]| clicked.iter().any(|c| words.iter().any(|w| c.contains(w)));
    (seen(DELIVERY_WORDS), seen(PAYMENT_WORDS))
}

/// After a click on the checkout page, stop once both methods are chosen.
pub fn checkout_ready(current_path: &str, executed: &ExecutedTool, window: &[ChatTurn]) -> Option<AgentReply> {
    if current_path != CHECKOUT_PATH || executed.name != "click_element" {
        return None;
    }
    let (delivery, payment) = checkout_selections(window);
    (delivery && payment).then(|| AgentReply::message(CHECKOUT_READY_MESSAGE))
}

// ── Loop breakers ──────────────────────────────────────────────────────

/// The proposed `fill_input` targets the selector the immediately preceding
/// (successful) `fill_input` already filled.
pub fn duplicate_fill(window: &[ChatTurn], call: &PendingToolCall) -> bool {
    if call.function != "fill_input" {
        return false;
    }
    let Some(last) = window.last().filter(|t| t.is_function("fill_input")) else {
        return false;
    };
    let result = last.result_value();
    let selector = call.arguments["selector"].as_str();
    result["success"].as_bool().unwrap_or(false) && selector.is_some() && result["selector"].as_str() == selector
}

/// `name` appears at least twice among the function turns of the last
/// `recent` window entries.
pub fn repeating(window: &[ChatTurn], name: &str, recent: usize) -> bool {
    let start = window.len().saturating_sub(recent);
    window[start..].iter().filter(|t| t.is_function(name)).count() >= 2
}

// ── Tool-call conversion ───────────────────────────────────────────────

/// Provider tool call → endpoint shape. Unparsable arguments become `{}`.
pub fn to_pending(call: &ToolCall) -> PendingToolCall {
    let arguments: Value = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
    let id = if call.id.is_empty() {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    } else {
        call.id.clone()
    };
    PendingToolCall { id, function: call.function.name.clone(), arguments }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executed(name: &str, result: Value) -> ExecutedTool {
        ExecutedTool { name: name.into(), arguments: json!({}), result }
    }

    fn click(selector: &str) -> ChatTurn {
        ChatTurn::function("click_element", json!({"selector": selector}), &json!({"success": true, "clicked": selector}))
    }

    fn fill(selector: &str, success: bool) -> ChatTurn {
        ChatTurn::function(
            "fill_input",
            json!({"selector": selector}),
            &json!({"success": success, "filled": selector, "selector": selector}),
        )
    }

    #[test]
    fn auto_proceed_only_on_checkout_success() {
        let ok = executed("autofill_form", json!({"success": true}));
        let reply = auto_proceed("/checkout", &ok).unwrap();
        assert_eq!(reply.message, AUTO_PROCEED_MESSAGE);
        let call = reply.tool_call().unwrap();
        assert_eq!((call.id.as_str(), call.function.as_str()), ("auto_proceed", "get_page_state"));

        assert!(auto_proceed("/cart", &ok).is_none());
        assert!(auto_proceed("/checkout", &executed("autofill_form", json!({"error": "x"}))).is_none());
    }

    #[test]
    fn checkout_stops_after_both_clicks() {
        let window = vec![click("#delivery-express"), click("#payment-paypal")];
        let last = executed("click_element", json!({"success": true}));
        assert_eq!(checkout_ready("/checkout", &last, &window).unwrap().message, CHECKOUT_READY_MESSAGE);
        assert!(checkout_ready("/checkout", &last, &window[..1]).is_none());
        assert!(checkout_ready("/cart", &last, &window).is_none());
    }

    #[test]
    fn selection_keywords() {
        assert_eq!(checkout_selections(&[click("#Overnight")]), (true, false));
        assert_eq!(checkout_selections(&[click("input[value=\"credit_card\"]")]), (false, true));
        assert_eq!(checkout_selections(&[click("#place-order")]), (false, false));
    }

    #[test]
    fn duplicate_fill_needs_same_selector_and_success() {
        let call = PendingToolCall { id: "1".into(), function: "fill_input".into(), arguments: json!({"selector": "#city"}) };
        assert!(duplicate_fill(&[fill("#city", true)], &call));
        assert!(!duplicate_fill(&[fill("#city", false)], &call));
        assert!(!duplicate_fill(&[fill("#zip", true)], &call));
        assert!(!duplicate_fill(&[fill("#city", true), ChatTurn::user("next")], &call));
    }

    #[test]
    fn repetition_counts_recent_function_turns() {
        let window = vec![ChatTurn::user("go"), click("#a"), click("#b")];
        assert!(repeating(&window, "click_element", 3));
        assert!(!repeating(&window, "fill_input", 3));
        let spread = vec![click("#a"), ChatTurn::user("x"), ChatTurn::assistant("y"), click("#b")];
        assert!(!repeating(&spread, "click_element", 3));
    }

    #[test]
    fn pending_from_tool_call() {
        let call = ToolCall {
            id: String::new(),
            call_type: "function".into(),
            function: FunctionCall { name: "scroll_to".into(), arguments: "not json".into() },
        };
        let pending = to_pending(&call);
        assert!(pending.id.starts_with("call_"));
        assert_eq!(pending.arguments, json!({}));
    }
}
