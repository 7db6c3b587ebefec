// Auraluxe Engine — Stylist ("Paris")
//
// Photo-based styling advice and a short follow-up chat. Both ground the
// model in the live catalog, annotated with the stored visual analyses.

use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{CatalogStore, Embedder};
use crate::engine::cascade::{ChatOptions, InferenceCascade};
use crate::engine::embedding::{embed_image, find_similar};
use crate::engine::types::*;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

const STYLE_HINT: &str = "Analyze for jewelry style matching";
const DEFAULT_REQUEST: &str = "Recommend jewelry for this look";
const DEFAULT_USER_TEXT: &str = "Analyze my style from this photo and recommend 2 perfect jewelry pieces.";
const ANALYZE_MAX_TOKENS: u32 = 400;
const CHAT_TEMPERATURE: f64 = 0.7;
const CHAT_MAX_TOKENS_WITH_IMAGE: u32 = 100;
const CHAT_MAX_TOKENS: u32 = 250;

pub struct Stylist {
    cascade: Arc<InferenceCascade>,
    embedder: Arc<dyn Embedder>,
    catalog: Arc<dyn CatalogStore>,
}

impl Stylist {
    pub fn new(cascade: Arc<InferenceCascade>, embedder: Arc<dyn Embedder>, catalog: Arc<dyn CatalogStore>) -> Self {
        Stylist { cascade, embedder, catalog }
    }

    /// Visual analyses keyed by product id.
    async fn visuals(&self, products: &[CatalogItem]) -> HashMap<String, VisualAnalysis> {
        let ids: Vec<String> = products.iter().map(|p| p.id.clone()).collect();
        match self.catalog.analyses_for(&ids).await {
            Ok(records) => records
                .into_iter()
                .filter_map(|r| r.visual_analysis.map(|v| (r.product_id, v)))
                .collect(),
            Err(e) => {
                warn!("[stylist] loading analyses failed: {}", e);
                HashMap::new()
            }
        }
    }

    /// Describe the person in `image_url` and recommend two catalog pieces.
    /// `image_url` may be a data URL.
    pub async fn analyze_style(&self, image_url: &str, context: Option<&str>) -> EngineResult<String> {
        let similar = match embed_image(&self.cascade, self.embedder.as_ref(), image_url, Some(STYLE_HINT)).await {
            Ok(image) => {
                find_similar(self.catalog.as_ref(), &image.embedding, STYLE_MATCH_LIMIT, STYLE_MATCH_THRESHOLD).await
            }
            Err(e) => {
                warn!("[stylist] embedding search failed, using all products: {}", e);
                vec![]
            }
        };

        let all = self.catalog.list_items(CATALOG_CONTEXT_LIMIT).await?;
        let mut products = similar;
        for item in all {
            if !products.iter().any(|p| p.id == item.id) {
                products.push(item);
            }
        }
        products.truncate(STYLIST_PRODUCT_LIST);
        info!("[stylist] analysing photo against {} products", products.len());

        let visuals = self.visuals(&products).await;
        let listing = products
            .iter()
            .map(|p| {
                let v = visuals.get(&p.id);
                let style = v.and_then(|v| v.style.as_deref()).map(|s| format!(" - Style: {}", s)).unwrap_or_default();
                let metal =
                    v.and_then(|v| v.metal_type.as_deref()).map(|m| format!(" - Metal: {}", m)).unwrap_or_default();
                format!("{} ({}) - {} - ${}{}{}", p.name, p.category, p.material, p.price, style, metal)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let request = context.filter(|c| !c.trim().is_empty());
        let system = format!(
            "You are Paris, a professional fashion stylist with expertise in men's and women's jewelry styling.

USER'S REQUEST: \"{}\"

AVAILABLE PRODUCTS (USE EXACT NAMES):
{}

RULES:
1. ONLY recommend products from the list above using EXACT product names
2. Describe the photo (who, what they're wearing, occasion)
3. Recommend EXACTLY 2 products that exist in the list
4. Men: watches, rings, bracelets only
5. Women: any jewelry category
6. Match metals to skin tone and outfit
7. Consider formality and occasion

Format: Describe photo, then recommend 2 products with reasoning.",
            request.unwrap_or(DEFAULT_REQUEST),
            listing
        );

        self.cascade
            .run_vision_completion(
                vec![Message::system(system), Message::user_with_image(request.unwrap_or(DEFAULT_USER_TEXT), image_url)],
                ChatOptions { temperature: None, max_tokens: Some(ANALYZE_MAX_TOKENS) },
            )
            .await
    }

    /// Short follow-up answer. With `image_context` the reply is kept to a
    /// quick product suggestion instead of a fresh analysis.
    pub async fn chat(&self, messages: &[ChatTurn], image_context: Option<&str>) -> EngineResult<String> {
        let products: Vec<CatalogItem> =
            self.catalog.list_items(CATALOG_CONTEXT_LIMIT).await?.into_iter().take(STYLIST_CHAT_PRODUCTS).collect();
        let visuals = self.visuals(&products).await;
        let context = products
            .iter()
            .map(|p| {
                let extra = visuals
                    .get(&p.id)
                    .map(|v| {
                        format!(
                            " - Style: {} - Colors: {}",
                            v.style.as_deref().unwrap_or(""),
                            v.dominant_colors.join(", ")
                        )
                    })
                    .unwrap_or_default();
                let category = if p.category.is_empty() { "N/A" } else { &p.category };
                let material = if p.material.is_empty() { "N/A" } else { &p.material };
                format!("{} - {} - {} - ${}{}", p.name, category, material, p.price, extra)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let with_image = image_context.is_some_and(|c| !c.trim().is_empty());
        let system = if with_image {
            let question = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            format!(
                "CHAT MODE - Answer the question briefly. DO NOT repeat any previous analysis.

User's question: {}

Products available:
{}

Respond in under 300 chars. If asking about watches: \"I'd suggest [Name 1] and [Name 2]!\" Never mention IDs.",
                question, context
            )
        } else {
            format!(
                "You are Paris. Brief responses under 300 chars.

Products:
{}

Recommend 2 products max. No IDs.",
                context
            )
        };

        let start = messages.len().saturating_sub(STYLIST_CHAT_HISTORY);
        let mut prompt = vec![Message::system(system)];
        prompt.extend(messages[start..].iter().filter(|m| m.role != TurnRole::Function).map(Message::from));

        let completion = self
            .cascade
            .run_chat_completion(
                prompt,
                vec![],
                ChatOptions {
                    temperature: Some(CHAT_TEMPERATURE),
                    max_tokens: Some(if with_image { CHAT_MAX_TOKENS_WITH_IMAGE } else { CHAT_MAX_TOKENS }),
                },
            )
            .await?;
        Ok(completion.text)
    }
}
