// Auraluxe Engine — Tool Executor
// Executes tool calls approved in the agent loop. Every handler returns a
// structured JSON result; failures become `{"error": "..."}` so the model
// sees them on the next turn instead of the turn failing.

use crate::atoms::constants::{DEFAULT_COUNTRY, SEARCH_RESULT_LIMIT};
use crate::atoms::traits::{CatalogStore, PageController, ShopperStore};
use crate::engine::tools::is_ops_only;
use crate::engine::types::*;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ToolExecutor {
    catalog: Arc<dyn CatalogStore>,
    shoppers: Arc<dyn ShopperStore>,
    page: Arc<dyn PageController>,
}

type HandlerResult = Result<Value, String>;

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args[key].as_str().filter(|s| !s.is_empty())
}

fn required<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    str_arg(args, key).ok_or_else(|| format!("Missing required argument: {}", key))
}

impl ToolExecutor {
    pub fn new(catalog: Arc<dyn CatalogStore>, shoppers: Arc<dyn ShopperStore>, page: Arc<dyn PageController>) -> Self {
        ToolExecutor { catalog, shoppers, page }
    }

    pub fn page(&self) -> &Arc<dyn PageController> {
        &self.page
    }

    /// Run one tool call and return its result object.
    pub async fn execute(&self, call: &PendingToolCall, user_id: Option<&str>, ops_mode: bool) -> Value {
        let name = call.function.as_str();
        let args = &call.arguments;
        info!("[tools] Executing {} args={}", name, truncate_utf8(&args.to_string(), 200));

        if !ops_mode && is_ops_only(name) {
            return json!({ "error": format!("{} is only available in ops mode", name) });
        }

        let result = match name {
            "search_products" => self.search_products(args).await,
            "get_product_details" => self.get_product_details(args).await,
            "add_to_cart" => self.add_to_cart(args, user_id).await,
            "navigate_to_checkout" => self.navigate("/checkout").await.map(|_| json!({ "success": true, "navigating": true })),
            "navigate_to_page" => self.navigate_to_page(args).await,
            "click_element" => self.click_element(args).await,
            "fill_input" => self.fill_input(args).await,
            "scroll_to" => self.scroll_to(args).await,
            "check_cart" => self.check_cart(user_id).await,
            "autofill_form" => self.autofill_form(args).await,
            "get_page_state" => self.get_page_state().await,
            other => Err(format!("Unknown tool: {}", other)),
        };

        result.unwrap_or_else(|e| {
            warn!("[tools] {} failed: {}", name, e);
            json!({ "error": e })
        })
    }

    // ── Catalog ────────────────────────────────────────────────────────

    async fn search_products(&self, args: &Value) -> HandlerResult {
        let query = args["query"].as_str().unwrap_or_default();
        let items = self
            .catalog
            .search_items(query, args["minPrice"].as_f64(), args["maxPrice"].as_f64(), SEARCH_RESULT_LIMIT)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "count": items.len(), "products": items }))
    }

    async fn get_product_details(&self, args: &Value) -> HandlerResult {
        let id = required(args, "product_id")?;
        let item = self.catalog.get_item(id).await.map_err(|e| e.to_string())?;
        Ok(json!({ "product": item }))
    }

    // ── Cart ───────────────────────────────────────────────────────────

    /// Read the existing line, then update or insert. Not atomic: two
    /// concurrent adds for the same product may both insert.
    async fn add_to_cart(&self, args: &Value, user_id: Option<&str>) -> HandlerResult {
        let Some(user_id) = user_id else {
            return Ok(json!({ "error": "Please log in" }));
        };
        let product_id = required(args, "product_id")?;
        let quantity = args["quantity"].as_f64().map(|q| q as i64).filter(|q| *q > 0).unwrap_or(1);
        let confirmed = args["confirmed"].as_bool().unwrap_or(false);

        let existing = self.shoppers.cart_line(user_id, product_id).await.map_err(|e| e.to_string())?;
        match existing {
            Some(line) if !confirmed => Ok(json!({
                "alreadyInCart": true,
                "currentQuantity": line.quantity,
                "needsConfirmation": true,
            })),
            Some(line) => {
                self.shoppers
                    .set_cart_quantity(&line.id, line.quantity + quantity)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "success": true, "message": "Quantity updated" }))
            }
            None => {
                self.shoppers
                    .insert_cart_line(user_id, product_id, quantity)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "success": true, "message": "Added to cart" }))
            }
        }
    }

    async fn check_cart(&self, user_id: Option<&str>) -> HandlerResult {
        let Some(user_id) = user_id else {
            return Ok(json!({ "cartItems": [], "isEmpty": true, "message": "Please log in to view cart" }));
        };
        let lines = self.shoppers.cart_lines(user_id).await.map_err(|e| e.to_string())?;
        if lines.is_empty() {
            return Ok(json!({
                "cartItems": [],
                "isEmpty": true,
                "totalItems": 0,
                "totalQuantity": 0,
                "message": "Cart is empty",
            }));
        }

        let items: Vec<Value> = lines
            .iter()
            .map(|l| {
                let name = if l.name.is_empty() { "Unknown" } else { l.name.as_str() };
                json!({
                    "id": l.id,
                    "product_id": l.product_id,
                    "name": name,
                    "quantity": l.quantity,
                    "price": l.price,
                    "total": l.price * l.quantity as f64,
                })
            })
            .collect();
        let total_quantity: i64 = lines.iter().map(|l| l.quantity).sum();
        let total_price: f64 = lines.iter().map(|l| l.price * l.quantity as f64).sum();

        Ok(json!({
            "cartItems": items,
            "isEmpty": false,
            "totalItems": lines.len(),
            "totalQuantity": total_quantity,
            "totalPrice": format!("{:.2}", total_price),
            "message": format!("Found {} item(s) in cart with {} total quantity", lines.len(), total_quantity),
        }))
    }

    // ── Page ───────────────────────────────────────────────────────────

    async fn navigate(&self, path: &str) -> Result<(), String> {
        self.page.navigate(path).await.map_err(|e| e.to_string())
    }

    async fn navigate_to_page(&self, args: &Value) -> HandlerResult {
        let path = required(args, "path")?;
        self.navigate(path).await?;
        Ok(json!({ "success": true, "navigated": path }))
    }

    async fn click_element(&self, args: &Value) -> HandlerResult {
        let selector = required(args, "selector")?;
        if self.page.click(selector).await.map_err(|e| e.to_string())? {
            Ok(json!({ "success": true, "clicked": selector }))
        } else {
            Ok(json!({ "error": "Element not found" }))
        }
    }

    async fn fill_input(&self, args: &Value) -> HandlerResult {
        let selector = required(args, "selector")?;
        let value = args["value"].as_str().unwrap_or_default();
        if self.page.fill(selector, value).await.map_err(|e| e.to_string())? {
            return Ok(json!({ "success": true, "filled": selector, "selector": selector, "value": value }));
        }
        let snapshot = self.page.introspect().await.map_err(|e| e.to_string())?;
        let available: Vec<&str> = snapshot.fields.iter().filter_map(|f| f.label()).collect();
        Ok(json!({
            "error": format!(
                "Input field \"{}\" not found on page. Available inputs: {}",
                selector,
                available.join(", ")
            )
        }))
    }

    async fn scroll_to(&self, args: &Value) -> HandlerResult {
        let selector = required(args, "selector")?;
        if self.page.scroll(selector).await.map_err(|e| e.to_string())? {
            Ok(json!({ "success": true, "scrolled": selector }))
        } else {
            Ok(json!({ "error": "Element not found" }))
        }
    }

    /// Fill every empty form field whose name/placeholder/id/type matches a
    /// provided detail. Country is always filled, defaulting to the US.
    async fn autofill_form(&self, args: &Value) -> HandlerResult {
        let snapshot = self.page.introspect().await.map_err(|e| e.to_string())?;
        let mut filled: Vec<&'static str> = Vec::new();

        for field in snapshot.form_fields().filter(|f| !f.is_filled()) {
            let Some((key, value)) = autofill_value(field, args) else {
                continue;
            };
            let Some(selector) = field.selector() else {
                continue;
            };
            if self.page.fill(&selector, &value).await.map_err(|e| e.to_string())? {
                filled.push(key);
            }
        }

        Ok(json!({
            "success": true,
            "filledFields": filled,
            "totalFilled": filled.len(),
            "message": format!("Filled {} fields: {}", filled.len(), filled.join(", ")),
        }))
    }

    async fn get_page_state(&self) -> HandlerResult {
        let snapshot = self.page.introspect().await.map_err(|e| e.to_string())?;

        let fields: Vec<&PageField> = snapshot.form_fields().collect();
        let total_fields = fields.len();
        let filled_fields = fields.iter().filter(|f| f.is_filled()).count();
        let inputs: Vec<Value> = fields
            .iter()
            .filter(|f| !f.is_filled())
            .filter_map(|f| {
                let selector = f.selector()?;
                Some(json!({
                    "type": f.kind,
                    "name": f.name,
                    "id": f.id,
                    "placeholder": f.placeholder,
                    "selector": selector,
                }))
            })
            .collect();
        let options: Vec<&PageOption> =
            snapshot.options.iter().filter(|o| !o.selector.is_empty() && !o.label.trim().is_empty()).collect();

        let message = format!(
            "Filled {}/{} text fields. {} remaining. {} clickable options available.",
            filled_fields,
            total_fields,
            inputs.len(),
            options.len()
        );
        Ok(json!({
            "currentPage": snapshot.path,
            "availableButtons": snapshot.buttons.iter().take(10).collect::<Vec<_>>(),
            "availableInputs": inputs,
            "clickableOptions": options.iter().take(20).collect::<Vec<_>>(),
            "pageHeadings": snapshot.headings.iter().take(5).collect::<Vec<_>>(),
            "totalFields": total_fields,
            "filledFields": filled_fields,
            "remainingFields": inputs.len(),
            "allFieldsFilled": inputs.is_empty() && total_fields > 0,
            "message": message,
        }))
    }
}

/// Which detail (if any) an empty field should receive. The first rule that
/// matches the field and has a value wins; country always has one.
fn autofill_value(field: &PageField, details: &Value) -> Option<(&'static str, String)> {
    let name = field.name.to_lowercase();
    let placeholder = field.placeholder.to_lowercase();
    let id = field.id.to_lowercase();
    let any = |needle: &str| name.contains(needle) || placeholder.contains(needle) || id.contains(needle);
    let detail = |key: &str| str_arg(details, key).map(str::to_string);

    let rules: [(bool, &'static str); 7] = [
        (any("name"), "name"),
        (field.kind == "email" || name.contains("email") || placeholder.contains("email"), "email"),
        (any("address"), "address"),
        (name.contains("city") || placeholder.contains("city"), "city"),
        (name.contains("state") || placeholder.contains("state"), "state"),
        (name.contains("zip") || name.contains("postal") || placeholder.contains("zip"), "zip"),
        (field.kind == "tel" || name.contains("phone") || placeholder.contains("phone"), "phone"),
    ];
    rules
        .into_iter()
        .filter(|(hit, _)| *hit)
        .find_map(|(_, key)| detail(key).map(|v| (key, v)))
        .or_else(|| {
            any("country").then(|| ("country", detail("country").unwrap_or_else(|| DEFAULT_COUNTRY.to_string())))
        })
}
