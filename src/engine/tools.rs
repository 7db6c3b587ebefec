// Auraluxe Engine — Agent tool registry
// ToolDefinition constructors for the shopping assistant. The struct itself
// lives in crate::atoms::types; dispatch lives in engine/tool_executor.rs.

use crate::atoms::types::*;
use serde_json::{json, Value};

/// Tools that touch the live page and are only offered in ops mode.
pub const OPS_ONLY_TOOLS: &[&str] = &[
    "navigate_to_page",
    "click_element",
    "fill_input",
    "scroll_to",
    "get_page_state",
    "autofill_form",
];

pub fn is_ops_only(name: &str) -> bool {
    OPS_ONLY_TOOLS.contains(&name)
}

fn function(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".into(),
        function: FunctionDefinition { name: name.into(), description: description.into(), parameters },
    }
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl ToolDefinition {
    pub fn add_to_cart() -> Self {
        function(
            "add_to_cart",
            "Add a product to the user's shopping cart. ONLY add items user explicitly requested. Default quantity is 1.",
            json!({
                "type": "object",
                "properties": {
                    "product_id": { "type": "string", "description": "The product ID to add" },
                    "quantity": { "type": "number", "description": "Quantity to add (default: 1, only change if user specifies)" },
                    "confirmed": { "type": "boolean", "description": "Set true if user confirmed adding to existing cart item" }
                },
                "required": ["product_id"]
            }),
        )
    }

    pub fn search_products() -> Self {
        function(
            "search_products",
            "Search for products by name, category, material, or price range",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "minPrice": { "type": "number", "description": "Minimum price filter" },
                    "maxPrice": { "type": "number", "description": "Maximum price filter" }
                },
                "required": ["query"]
            }),
        )
    }

    pub fn get_product_details() -> Self {
        function(
            "get_product_details",
            "Get detailed information about a specific product",
            json!({
                "type": "object",
                "properties": {
                    "product_id": { "type": "string", "description": "The product ID" }
                },
                "required": ["product_id"]
            }),
        )
    }

    pub fn navigate_to_checkout() -> Self {
        function("navigate_to_checkout", "Navigate user to checkout page to complete their order", no_params())
    }

    pub fn navigate_to_page() -> Self {
        function(
            "navigate_to_page",
            "Navigate to any page on the website (Ops Mode only)",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Page path like /shop, /cart, /profile" }
                },
                "required": ["path"]
            }),
        )
    }

    pub fn click_element() -> Self {
        function(
            "click_element",
            "Click any button or element on the page (Ops Mode only)",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of element to click" }
                },
                "required": ["selector"]
            }),
        )
    }

    pub fn fill_input() -> Self {
        function(
            "fill_input",
            "Fill any input field on the page (Ops Mode only). IMPORTANT: Call get_page_state FIRST to get correct selectors before using this.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of input field from get_page_state result" },
                    "value": { "type": "string", "description": "Value to fill" }
                },
                "required": ["selector", "value"]
            }),
        )
    }

    pub fn scroll_to() -> Self {
        function(
            "scroll_to",
            "Scroll to any element on the page (Ops Mode only)",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of element to scroll to" }
                },
                "required": ["selector"]
            }),
        )
    }

    pub fn check_cart() -> Self {
        function("check_cart", "Check current cart status and items", no_params())
    }

    pub fn get_page_state() -> Self {
        function(
            "get_page_state",
            "Get current page state and available input fields with their selectors (Ops Mode only). Use this BEFORE filling forms.",
            no_params(),
        )
    }

    pub fn autofill_form() -> Self {
        function(
            "autofill_form",
            "Fill all checkout form fields at once (Ops Mode only). If country not provided, infer from state (US states = United States).",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Full name" },
                    "email": { "type": "string", "description": "Email address" },
                    "address": { "type": "string", "description": "Street address" },
                    "city": { "type": "string", "description": "City" },
                    "state": { "type": "string", "description": "State" },
                    "zip": { "type": "string", "description": "Zip code" },
                    "phone": { "type": "string", "description": "Phone number" },
                    "country": { "type": "string", "description": "Country (infer from state if not provided)" }
                },
                "required": []
            }),
        )
    }

    /// Every tool, in the order they are offered to the model.
    pub fn shopping_tools() -> Vec<Self> {
        vec![
            Self::add_to_cart(),
            Self::search_products(),
            Self::get_product_details(),
            Self::navigate_to_checkout(),
            Self::navigate_to_page(),
            Self::click_element(),
            Self::fill_input(),
            Self::scroll_to(),
            Self::check_cart(),
            Self::get_page_state(),
            Self::autofill_form(),
        ]
    }
}

/// Tools offered for one turn. Without ops mode the page-manipulation
/// tools are withheld.
pub fn registry(ops_mode: bool) -> Vec<ToolDefinition> {
    ToolDefinition::shopping_tools()
        .into_iter()
        .filter(|t| ops_mode || !is_ops_only(&t.function.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tools: &[ToolDefinition]) -> Vec<&str> {
        tools.iter().map(|t| t.function.name.as_str()).collect()
    }

    #[test]
    fn ops_mode_offers_everything() {
        assert_eq!(registry(true).len(), 11);
    }

    #[test]
    fn shopping_mode_withholds_page_tools() {
        let tools = registry(false);
        assert_eq!(
            names(&tools),
            vec!["add_to_cart", "search_products", "get_product_details", "navigate_to_checkout", "check_cart"]
        );
    }

    #[test]
    fn schemas_are_objects() {
        for tool in ToolDefinition::shopping_tools() {
            assert_eq!(tool.tool_type, "function");
            assert_eq!(tool.function.parameters["type"], "object", "{}", tool.function.name);
        }
    }
}
