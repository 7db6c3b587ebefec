// Auraluxe Engine — Page model
//
// The agent's page tools talk to a PageController. This module holds the
// snapshot helpers the tool handlers share (selectors, fill counts) and
// SimulatedPage, an in-memory storefront used by the CLI and the tests.
//
// Supported selectors: `#id`, `tag`, `tag[attr="v"]`, `[attr="v"]` and any
// chain of attribute filters (`input[name="pay"][value="cod"]`).

use crate::atoms::error::EngineResult;
use crate::atoms::traits::PageController;
use crate::engine::types::*;
use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::LazyLock;

// ── Snapshot helpers ───────────────────────────────────────────────────────

impl PageField {
    /// Preferred selector: name, then id, then placeholder.
    pub fn selector(&self) -> Option<String> {
        if !self.name.is_empty() {
            Some(format!("input[name=\"{}\"]", self.name))
        } else if !self.id.is_empty() {
            Some(format!("#{}", self.id))
        } else if !self.placeholder.is_empty() {
            Some(format!("input[placeholder=\"{}\"]", self.placeholder))
        } else {
            None
        }
    }

    /// Short label used when listing inputs in error messages.
    pub fn label(&self) -> Option<&str> {
        [&self.name, &self.id, &self.placeholder]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
    }

    pub fn is_filled(&self) -> bool {
        !self.value.trim().is_empty()
    }

    /// The assistant's own chat box never counts as a page field.
    fn is_assistant_input(&self) -> bool {
        self.placeholder.to_lowercase().contains("gini")
    }
}

impl PageSnapshot {
    /// Text fields a form tool may fill (no radios, checkboxes or chat box).
    pub fn form_fields(&self) -> impl Iterator<Item = &PageField> {
        self.fields
            .iter()
            .filter(|f| f.kind != "radio" && f.kind != "checkbox" && !f.is_assistant_input())
    }
}

// ── Simulated page ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Button,
    Input,
    Heading,
}

#[derive(Debug, Clone)]
pub struct SimElement {
    pub kind: ElementKind,
    /// Tag-level type: `text`, `email`, `tel`, `radio`, `textarea`… (inputs only).
    pub input_type: String,
    pub id: String,
    pub name: String,
    pub placeholder: String,
    pub value: String,
    pub label: String,
    pub checked: bool,
}

impl SimElement {
    fn button(id: &str, label: &str) -> Self {
        SimElement {
            kind: ElementKind::Button,
            input_type: String::new(),
            id: id.into(),
            name: String::new(),
            placeholder: String::new(),
            value: String::new(),
            label: label.into(),
            checked: false,
        }
    }

    fn input(input_type: &str, name: &str, placeholder: &str) -> Self {
        SimElement {
            kind: ElementKind::Input,
            input_type: input_type.into(),
            id: name.into(),
            name: name.into(),
            placeholder: placeholder.into(),
            value: String::new(),
            label: String::new(),
            checked: false,
        }
    }

    fn radio(id: &str, group: &str, value: &str, label: &str) -> Self {
        SimElement {
            kind: ElementKind::Input,
            input_type: "radio".into(),
            id: id.into(),
            name: group.into(),
            placeholder: String::new(),
            value: value.into(),
            label: label.into(),
            checked: false,
        }
    }

    fn heading(text: &str) -> Self {
        SimElement {
            kind: ElementKind::Heading,
            input_type: String::new(),
            id: String::new(),
            name: String::new(),
            placeholder: String::new(),
            value: String::new(),
            label: text.into(),
            checked: false,
        }
    }

    fn tag(&self) -> &str {
        match self.kind {
            ElementKind::Button => "button",
            ElementKind::Heading => "h2",
            ElementKind::Input if self.input_type == "textarea" => "textarea",
            ElementKind::Input => "input",
        }
    }

    fn attr(&self, attr: &str) -> Option<&str> {
        match attr {
            "id" => Some(&self.id),
            "name" => Some(&self.name),
            "placeholder" => Some(&self.placeholder),
            "value" => Some(&self.value),
            "type" => Some(&self.input_type),
            _ => None,
        }
    }

    fn is_choice(&self) -> bool {
        self.input_type == "radio" || self.input_type == "checkbox"
    }

    fn option_selector(&self) -> Option<String> {
        if !self.id.is_empty() {
            Some(format!("#{}", self.id))
        } else if !self.name.is_empty() {
            Some(format!("input[name=\"{}\"][value=\"{}\"]", self.name, self.value))
        } else {
            None
        }
    }
}

static SELECTOR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^([a-zA-Z][a-zA-Z0-9]*)?((?:\[[a-zA-Z_-]+="[^"]*"\])*)$"#).ok());
static ATTR_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"\[([a-zA-Z_-]+)="([^"]*)"\]"#).ok());

/// A parsed selector: optional tag plus attribute equality filters.
#[derive(Debug, PartialEq)]
struct Selector {
    tag: Option<String>,
    attrs: Vec<(String, String)>,
}

impl Selector {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(id) = raw.strip_prefix('#') {
            return Some(Selector { tag: None, attrs: vec![("id".into(), id.to_string())] });
        }
        let caps = SELECTOR_RE.as_ref()?.captures(raw)?;
        let tag = caps.get(1).map(|m| m.as_str().to_lowercase());
        let attrs: Vec<(String, String)> = match (caps.get(2), ATTR_RE.as_ref()) {
            (Some(m), Some(attr_re)) => attr_re
                .captures_iter(m.as_str())
                .map(|c| (c[1].to_string(), c[2].to_string()))
                .collect(),
            _ => vec![],
        };
        if tag.is_none() && attrs.is_empty() {
            return None;
        }
        Some(Selector { tag, attrs })
    }

    fn matches(&self, el: &SimElement) -> bool {
        if let Some(tag) = &self.tag {
            let heading = el.kind == ElementKind::Heading && matches!(tag.as_str(), "h1" | "h2" | "h3");
            if tag != el.tag() && !heading {
                return false;
            }
        }
        self.attrs.iter().all(|(k, v)| el.attr(k) == Some(v.as_str()))
    }
}

struct PageState {
    path: String,
    elements: Vec<SimElement>,
    clicks: Vec<String>,
}

/// In-memory storefront page. Navigation swaps in the layout for the path;
/// field values and radio selections persist until the next navigation.
pub struct SimulatedPage {
    state: Mutex<PageState>,
}

impl SimulatedPage {
    pub fn new(path: &str) -> Self {
        SimulatedPage {
            state: Mutex::new(PageState { path: path.to_string(), elements: layout_for(path), clicks: vec![] }),
        }
    }

    /// Selectors clicked so far, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    /// Current value of the first element matching `selector`.
    pub fn value_of(&self, selector: &str) -> Option<String> {
        let sel = Selector::parse(selector)?;
        let state = self.state.lock();
        state.elements.iter().find(|e| sel.matches(e)).map(|e| e.value.clone())
    }

    /// `value` of the checked radio in `group`.
    pub fn selected(&self, group: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .find(|e| e.input_type == "radio" && e.name == group && e.checked)
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl PageController for SimulatedPage {
    fn current_path(&self) -> String {
        self.state.lock().path.clone()
    }

    async fn navigate(&self, path: &str) -> EngineResult<()> {
        info!("[page] navigate {}", path);
        let mut state = self.state.lock();
        state.path = path.to_string();
        state.elements = layout_for(path);
        Ok(())
    }

    async fn click(&self, selector: &str) -> EngineResult<bool> {
        let Some(sel) = Selector::parse(selector) else {
            return Ok(false);
        };
        let mut state = self.state.lock();
        let Some(idx) = state.elements.iter().position(|e| sel.matches(e)) else {
            return Ok(false);
        };
        let (group, is_radio, id) = {
            let el = &state.elements[idx];
            (el.name.clone(), el.input_type == "radio", el.id.clone())
        };
        if is_radio {
            for el in state.elements.iter_mut().filter(|e| e.input_type == "radio" && e.name == group) {
                el.checked = false;
            }
        }
        state.elements[idx].checked = true;
        state.clicks.push(selector.to_string());

        if id == "checkout-button" {
            state.path = "/checkout".into();
            state.elements = layout_for("/checkout");
        }
        Ok(true)
    }

    async fn fill(&self, selector: &str, value: &str) -> EngineResult<bool> {
        let Some(sel) = Selector::parse(selector) else {
            return Ok(false);
        };
        let mut state = self.state.lock();
        match state
            .elements
            .iter_mut()
            .find(|e| e.kind == ElementKind::Input && !e.is_choice() && sel.matches(e))
        {
            Some(el) => {
                el.value = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scroll(&self, selector: &str) -> EngineResult<bool> {
        let state = self.state.lock();
        Ok(Selector::parse(selector).is_some_and(|sel| state.elements.iter().any(|e| sel.matches(e))))
    }

    async fn introspect(&self) -> EngineResult<PageSnapshot> {
        let state = self.state.lock();
        let mut snapshot = PageSnapshot { path: state.path.clone(), ..Default::default() };
        for el in &state.elements {
            match el.kind {
                ElementKind::Heading => snapshot.headings.push(el.label.clone()),
                ElementKind::Button => {
                    snapshot.buttons.push(el.label.clone());
                    if let Some(selector) = el.option_selector() {
                        snapshot.options.push(PageOption {
                            kind: "button".into(),
                            value: el.value.clone(),
                            label: el.label.clone(),
                            selector,
                        });
                    }
                }
                ElementKind::Input => {
                    snapshot.fields.push(PageField {
                        kind: el.input_type.clone(),
                        name: el.name.clone(),
                        id: el.id.clone(),
                        placeholder: el.placeholder.clone(),
                        value: if el.is_choice() && !el.checked { String::new() } else { el.value.clone() },
                    });
                    if el.is_choice() {
                        if let Some(selector) = el.option_selector() {
                            snapshot.options.push(PageOption {
                                kind: el.input_type.clone(),
                                value: el.value.clone(),
                                label: el.label.clone(),
                                selector,
                            });
                        }
                    }
                }
            }
        }
        Ok(snapshot)
    }
}

// ── Layouts ────────────────────────────────────────────────────────────────

fn layout_for(path: &str) -> Vec<SimElement> {
    match path {
        "/checkout" => vec![
            SimElement::heading("Checkout"),
            SimElement::heading("Shipping Information"),
            SimElement::input("text", "fullName", "Full Name"),
            SimElement::input("email", "email", "Email"),
            SimElement::input("text", "address", "Street Address"),
            SimElement::input("text", "city", "City"),
            SimElement::input("text", "state", "State"),
            SimElement::input("text", "zip", "ZIP Code"),
            SimElement::input("tel", "phone", "Phone"),
            SimElement::input("text", "country", "Country"),
            SimElement::heading("Delivery Method"),
            SimElement::radio("delivery-standard", "delivery", "standard", "Standard Delivery (5-7 days) - Free"),
            SimElement::radio("delivery-express", "delivery", "express", "Express Delivery (2-3 days) - $15"),
            SimElement::radio("delivery-overnight", "delivery", "overnight", "Overnight Delivery - $35"),
            SimElement::heading("Payment Method"),
            SimElement::radio("payment-credit", "payment", "credit_card", "Credit Card"),
            SimElement::radio("payment-paypal", "payment", "paypal", "PayPal"),
            SimElement::radio("payment-cash", "payment", "cod", "Cash on Delivery"),
            SimElement::button("place-order", "Place Order"),
        ],
        "/cart" => vec![
            SimElement::heading("Shopping Cart"),
            SimElement::button("checkout-button", "Proceed to Checkout"),
            SimElement::button("continue-shopping", "Continue Shopping"),
        ],
        "/shop" => vec![
            SimElement::heading("Shop"),
            SimElement::input("text", "search", "Search jewelry..."),
            SimElement::button("filter-apply", "Apply Filters"),
        ],
        "/profile" => vec![
            SimElement::heading("My Profile"),
            SimElement::input("text", "name", "Your name"),
            SimElement::input("text", "address", "Address"),
            SimElement::button("save-profile", "Save"),
        ],
        _ => vec![SimElement::heading("Auraluxe"), SimElement::button("shop-now", "Shop Now")],
    }
}
