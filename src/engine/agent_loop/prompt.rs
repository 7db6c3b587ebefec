// agent_loop/prompt.rs — System prompt for the shopping assistant.

use crate::engine::types::*;
use regex::Regex;
use std::sync::LazyLock;

static DELIVERY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\b(standard|express|overnight)\b").ok());
static PAYMENT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(credit card|paypal|cash on delivery|cod)\b").ok());

fn user_text(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .filter(|t| t.role == TurnRole::User)
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_match(re: &Option<Regex>, text: &str) -> Option<String> {
    re.as_ref()?.find(text).map(|m| m.as_str().to_string())
}

/// Delivery method the shopper mentioned, as written.
pub fn preferred_delivery(turns: &[ChatTurn]) -> Option<String> {
    first_match(&DELIVERY_RE, &user_text(turns))
}

/// Payment method the shopper mentioned, as written.
pub fn preferred_payment(turns: &[ChatTurn]) -> Option<String> {
    first_match(&PAYMENT_RE, &user_text(turns))
}

pub fn system_prompt(
    user: Option<&UserContext>,
    products: &[CatalogItem],
    current_path: &str,
    ops_mode: bool,
    window: &[ChatTurn],
) -> String {
    let name = user.and_then(|u| u.name.as_deref()).unwrap_or("Guest");
    let orders = user.map(|u| u.total_orders).unwrap_or(0);
    let cart_lines = user.map(|u| u.cart.as_slice()).unwrap_or_default();
    let cart = if cart_lines.is_empty() {
        "empty".to_string()
    } else {
        cart_lines
            .iter()
            .map(|c| format!("{} (qty: {})", c.name, c.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let delivery = preferred_delivery(window).map(|d| format!("\nPreferred Delivery: {}", d)).unwrap_or_default();
    let payment = preferred_payment(window).map(|p| format!("\nPreferred Payment: {}", p)).unwrap_or_default();
    let catalog = products
        .iter()
        .map(|p| format!("{}:{}(${})", p.id, p.name, p.price))
        .collect::<Vec<_>>()
        .join(", ");
    let ops = if ops_mode {
        "OPS MODE: Full control - navigate_to_page, click_element, fill_input, scroll_to, check_cart, get_page_state. \"store/shop\" = /shop."
    } else {
        ""
    };

    format!(
        "You are Gini AI, Auraluxe's intelligent shopping assistant. EXECUTE tasks immediately and ADAPT to changes.

User: {name} | Orders: {orders}
Cart ({cart_count} items): {cart}
Page: {current_path}
{delivery}
{payment}

PAGES: / /shop /cart /checkout /favorites /orders /profile

Products: {catalog}

{ops}

CRITICAL RULES:
1. On /checkout: Use autofill_form to fill ALL fields at once
2. After autofill_form, call get_page_state to see clickableOptions
3. Use click_element ONCE for delivery (Standard/Express/Overnight)
4. Use click_element ONCE for payment (Credit Card/PayPal/Cash on Delivery)
5. After BOTH clicked, STOP and ask user to confirm checkout
6. NEVER click same option twice
7. If country missing, default to United States

One tool per response. Stop after delivery+payment selected.",
        cart_count = cart_lines.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_come_from_user_turns_only() {
        let turns = vec![
            ChatTurn::user("Use EXPRESS shipping please"),
            ChatTurn::assistant("Paying by paypal?"),
            ChatTurn::user("yes, Cash on Delivery"),
        ];
        assert_eq!(preferred_delivery(&turns).as_deref(), Some("EXPRESS"));
        assert_eq!(preferred_payment(&turns).as_deref(), Some("Cash on Delivery"));
        assert!(preferred_delivery(&[ChatTurn::user("standardize")]).is_none());
    }

    #[test]
    fn prompt_lists_user_cart_and_products() {
        let ctx = UserContext {
            user_id: "u1".into(),
            name: Some("Ava".into()),
            cart: vec![CartLine { id: "l1".into(), product_id: "a".into(), name: "Aurora Ring".into(), quantity: 2, price: 120.0 }],
            favorites: vec![],
            total_orders: 3,
        };
        let product = CatalogItem {
            id: "a".into(),
            name: "Aurora Ring".into(),
            category: "rings".into(),
            material: "gold".into(),
            price: 120.5,
            description: None,
            image_urls: vec![],
            video_url: None,
            image_360_url: None,
            stock: 1,
        };
        let prompt = system_prompt(Some(&ctx), &[product], "/cart", true, &[ChatTurn::user("overnight")]);
        assert!(prompt.contains("User: Ava | Orders: 3"));
        assert!(prompt.contains("Cart (1 items): Aurora Ring (qty: 2)"));
        assert!(prompt.contains("Products: a:Aurora Ring($120.5)"));
        assert!(prompt.contains("Preferred Delivery: overnight"));
        assert!(prompt.contains("OPS MODE"));
        assert!(prompt.ends_with("One tool per response. Stop after delivery+payment selected."));
    }

    #[test]
    fn guest_prompt() {
        let prompt = system_prompt(None, &[], "/", false, &[]);
        assert!(prompt.contains("User: Guest | Orders: 0"));
        assert!(prompt.contains("Cart (0 items): empty"));
        assert!(!prompt.contains("OPS MODE"));
    }
}
