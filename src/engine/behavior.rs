// Auraluxe Engine — Behaviour Capture
//
// Condenses a shopper's recent activity into a plain-text summary, embeds it
// and keeps one row per identity (user id, else session id) so similar
// shoppers can be looked up by vector similarity.

use crate::atoms::constants::SIMILAR_BEHAVIOR_THRESHOLD;
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{Embedder, ShopperStore};
use crate::engine::cascade::embed_with_fallback;
use crate::engine::types::*;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Everything known about one shopper's recent activity.
#[derive(Debug, Clone, Default)]
pub struct BehaviorInput {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub user_name: Option<String>,
    pub user_location: Option<String>,
    pub viewed: Vec<CatalogItem>,
    pub favorites: Vec<CatalogItem>,
    pub cart: Vec<CartLine>,
    pub searches: Vec<String>,
    pub total_orders: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Distinct values in first-seen order.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for v in values {
        if !out.iter().any(|o| o == v) {
            out.push(v.to_string());
        }
    }
    out
}

fn price_range(items: &[CatalogItem]) -> Option<PriceRange> {
    if items.is_empty() {
        return None;
    }
    let min = items.iter().map(|i| i.price).fold(f64::INFINITY, f64::min);
    let max = items.iter().map(|i| i.price).fold(f64::NEG_INFINITY, f64::max);
    let avg = items.iter().map(|i| i.price).sum::<f64>() / items.len() as f64;
    Some(PriceRange { min, max, avg })
}

fn names_or<'a>(names: impl Iterator<Item = &'a str>, empty: &str) -> String {
    let joined = names.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        empty.to_string()
    } else {
        joined
    }
}

/// The plain-text summary that gets embedded.
pub fn interaction_summary(input: &BehaviorInput) -> String {
    let categories = distinct(input.viewed.iter().map(|p| p.category.as_str()));
    let materials = distinct(input.viewed.iter().map(|p| p.material.as_str()));
    let (min, max, avg) = price_range(&input.viewed).map(|r| (r.min, r.max, r.avg)).unwrap_or_default();

    format!(
        "User: {} from {}.\n\
         Viewed {} products in categories: {}.\n\
         Preferred materials: {}.\n\
         Price range: ${}-${} (avg: ${:.0}).\n\
         Favorites: {}.\n\
         Cart: {}.\n\
         Searches: {}.\n\
         Orders: {} total orders.",
        input.user_name.as_deref().unwrap_or("Guest"),
        input.user_location.as_deref().unwrap_or("Unknown location"),
        input.viewed.len(),
        categories.join(", "),
        materials.join(", "),
        min,
        max,
        avg,
        names_or(input.favorites.iter().map(|f| f.name.as_str()), "none"),
        names_or(input.cart.iter().map(|c| c.name.as_str()), "empty"),
        names_or(input.searches.iter().map(String::as_str), "none"),
        input.total_orders,
    )
}

pub fn preferences(input: &BehaviorInput) -> Value {
    let price = price_range(&input.viewed).map(|r| json!({ "min": r.min, "max": r.max, "avg": r.avg }));
    json!({
        "categories": distinct(input.viewed.iter().map(|p| p.category.as_str())),
        "materials": distinct(input.viewed.iter().map(|p| p.material.as_str())),
        "priceRange": price,
        "favoriteCategories": distinct(input.favorites.iter().map(|f| f.category.as_str())),
        "searchTerms": input.searches,
        "totalOrders": input.total_orders,
    })
}

fn behavior_data(input: &BehaviorInput) -> Value {
    json!({
        "viewedProducts": input.viewed.iter()
            .map(|p| json!({ "id": p.id, "name": p.name, "category": p.category, "price": p.price }))
            .collect::<Vec<_>>(),
        "favorites": input.favorites.iter()
            .map(|f| json!({ "id": f.id, "name": f.name, "category": f.category }))
            .collect::<Vec<_>>(),
        "cartItems": input.cart.iter()
            .map(|c| json!({ "id": c.product_id, "name": c.name, "quantity": c.quantity }))
            .collect::<Vec<_>>(),
        "searches": input.searches,
    })
}

pub struct BehaviorTracker {
    embedder: Arc<dyn Embedder>,
    shoppers: Arc<dyn ShopperStore>,
    embed_timeout: Duration,
}

impl BehaviorTracker {
    pub fn new(embedder: Arc<dyn Embedder>, shoppers: Arc<dyn ShopperStore>, embed_timeout: Duration) -> Self {
        BehaviorTracker { embedder, shoppers, embed_timeout }
    }

    /// Summarise, embed (falling back to the synthetic vector) and upsert.
    pub async fn capture(&self, input: &BehaviorInput) -> EngineResult<BehaviorRecord> {
        let summary = interaction_summary(input);
        let (embedding, fallback) = embed_with_fallback(self.embedder.as_ref(), &summary, self.embed_timeout).await;
        if fallback {
            warn!("[behavior] stored summary with fallback embedding");
        }

        let record = BehaviorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: input.user_id.clone(),
            session_id: input.session_id.clone(),
            user_name: input.user_name.clone(),
            user_location: input.user_location.clone(),
            interaction_summary: summary,
            behavior_data: behavior_data(input),
            preferences: preferences(input),
            embedding,
            similarity: None,
        };
        self.shoppers.upsert_behavior(&record).await?;
        info!(
            "[behavior] captured {} viewed / {} favorites for {}",
            input.viewed.len(),
            input.favorites.len(),
            record.user_id.as_deref().or(record.session_id.as_deref()).unwrap_or("?")
        );
        Ok(record)
    }

    /// Stored shoppers whose summaries resemble `query`.
    pub async fn find_similar_behaviors(&self, query: &str, limit: usize) -> EngineResult<Vec<BehaviorRecord>> {
        let (embedding, _) = embed_with_fallback(self.embedder.as_ref(), query, self.embed_timeout).await;
        self.shoppers.similar_behaviors(&embedding, SIMILAR_BEHAVIOR_THRESHOLD, limit).await
    }
}
