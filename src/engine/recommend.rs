// Auraluxe Engine — AI Recommendations
//
// The model picks product numbers from a numbered catalog listing; the
// answer is validated and padded locally. When every provider fails the
// instant ScoringEngine ranking is served instead.

use crate::atoms::constants::{AI_RECOMMENDATION_COUNT, ANALYSIS_FALLBACK_COUNT, CATALOG_CONTEXT_LIMIT};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::CatalogStore;
use crate::engine::cascade::{ChatOptions, InferenceCascade};
use crate::engine::scoring::{ScoringEngine, ScoringSignal};
use crate::engine::types::*;
use log::{info, warn};
use regex::Regex;
use std::sync::{Arc, LazyLock};

const RECOMMEND_SYSTEM_PROMPT: &str = "You are Auraluxe's AI recommendation engine. CRITICAL: When user views specific categories, PRIORITIZE those categories heavily (at least 5 out of 7 items). Match their viewed materials and price range closely. Only add 1-2 complementary items from other categories.";
const RECOMMEND_MAX_TOKENS: u32 = 50;

static UUID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok());

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

fn or_na(s: &str) -> &str {
    if s.is_empty() {
        "N/A"
    } else {
        s
    }
}

/// One-line description of the shopper for the prompt.
pub fn shopper_profile(user: Option<&UserContext>, viewed: &[CatalogItem]) -> String {
    let categories = distinct(viewed.iter().map(|p| p.category.clone())).join(", ");
    if let Some(u) = user {
        return format!(
            "Returning customer! Orders: {}. Favorite categories: {}. Recently viewed categories: {}. Cart: {}.",
            u.total_orders,
            u.favorites.iter().map(|f| f.category.as_str()).collect::<Vec<_>>().join(", "),
            categories,
            u.cart.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
        );
    }
    if viewed.is_empty() {
        return "New visitor - show diverse bestsellers.".into();
    }
    let min = viewed.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
    let max = viewed.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
    let avg = viewed.iter().map(|p| p.price).sum::<f64>() / viewed.len() as f64;
    format!(
        "Guest browsing. STRONG PREFERENCE for: {}. Materials: {}. Price range: ${}-${} (avg: ${:.0}). Viewed: {}.",
        categories,
        distinct(viewed.iter().map(|p| p.material.clone())).join(", "),
        min,
        max,
        avg,
        viewed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "),
    )
}

pub fn numbered_listing(products: &[CatalogItem]) -> String {
    products
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {} - {} - {} - ${}", i + 1, p.name, or_na(&p.category), or_na(&p.material), p.price))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse "3, 1, 9" into distinct zero-based indices below `len`, then pad
/// with the lowest unused indices up to `count`.
pub fn pick_indices(answer: &str, len: usize, count: usize) -> Vec<usize> {
    let mut picked: Vec<usize> = vec![];
    for part in answer.split(',') {
        let Ok(n) = part.trim().parse::<usize>() else { continue };
        if (1..=len).contains(&n) && !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    picked.truncate(count);
    let mut next = 0;
    while picked.len() < count.min(len) {
        if !picked.contains(&next) {
            picked.push(next);
        }
        next += 1;
    }
    picked
}

pub struct Recommender {
    cascade: Arc<InferenceCascade>,
    catalog: Arc<dyn CatalogStore>,
    scoring: ScoringEngine,
}

impl Recommender {
    pub fn new(cascade: Arc<InferenceCascade>, catalog: Arc<dyn CatalogStore>, scoring: ScoringEngine) -> Self {
        Recommender { cascade, catalog, scoring }
    }

    /// Seven picks for the shopper described by `signal` (and `user`, when
    /// signed in).
    pub async fn recommend(&self, signal: &BehaviorSignal, user: Option<&UserContext>) -> EngineResult<Vec<CatalogItem>> {
        let products = self.catalog.list_items(CATALOG_CONTEXT_LIMIT).await?;
        if products.is_empty() {
            return Ok(vec![]);
        }
        let viewed = if signal.viewed.is_empty() { vec![] } else { self.catalog.items_by_ids(&signal.viewed).await? };

        let prompt = format!(
            "Customer Profile:\n{}\n\nAvailable Products:\n{}\n\nIMPORTANT: If customer viewed specific categories, recommend mostly from those categories. Select 7 product numbers (1-{}). Return ONLY numbers separated by commas.",
            shopper_profile(user, &viewed),
            numbered_listing(&products),
            products.len()
        );
        let answer = self
            .cascade
            .run_chat_completion(
                vec![Message::system(RECOMMEND_SYSTEM_PROMPT), Message::user(prompt)],
                vec![],
                ChatOptions { temperature: None, max_tokens: Some(RECOMMEND_MAX_TOKENS) },
            )
            .await;

        match answer {
            Ok(completion) => {
                let picks = pick_indices(&completion.text, products.len(), AI_RECOMMENDATION_COUNT);
                info!("[recommend] model picked {:?}", picks);
                Ok(picks.into_iter().filter_map(|i| products.get(i).cloned()).collect())
            }
            Err(e) => {
                warn!("[recommend] cascade failed, using instant ranking: {}", e);
                let ranked = self.scoring.rank(
                    &products,
                    &ScoringSignal { viewed: &viewed, favorites: &signal.favorites, cart: &signal.cart },
                );
                Ok(ranked)
            }
        }
    }

    /// Products a stylist analysis mentions, by id or exact name. Nothing
    /// recognised → the first few catalog items.
    pub async fn recommend_from_analysis(&self, analysis: &str) -> EngineResult<Vec<CatalogItem>> {
        let products = self.catalog.list_items(CATALOG_CONTEXT_LIMIT).await?;
        let mentioned_ids: Vec<String> = match UUID_RE.as_ref() {
            Some(re) => re.find_iter(analysis).map(|m| m.as_str().to_lowercase()).collect(),
            None => vec![],
        };

        let picks: Vec<CatalogItem> = products
            .iter()
            .filter(|p| mentioned_ids.contains(&p.id.to_lowercase()) || (!p.name.is_empty() && analysis.contains(&p.name)))
            .cloned()
            .collect();

        if picks.is_empty() {
            return Ok(products.into_iter().take(ANALYSIS_FALLBACK_COUNT).collect());
        }
        Ok(picks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::ProviderError;
    use crate::engine::sessions::SessionStore;
    use crate::engine::test_support::{cascade_of, item, ScriptedProvider};

    fn catalog() -> Arc<SessionStore> {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        let rows = [
            ("11111111-1111-1111-1111-111111111111", "Aurora Ring", "rings", "gold", 500.0),
            ("b", "Bella Band", "rings", "silver", 250.0),
            ("c", "Cleo Chain", "necklaces", "gold", 100.0),
            ("d", "Dora Drops", "earrings", "pearl", 80.0),
            ("e", "Esme Cuff", "bracelets", "gold", 300.0),
            ("f", "Faye Pendant", "necklaces", "silver", 120.0),
            ("g", "Gala Studs", "earrings", "diamond", 900.0),
            ("h", "Halo Ring", "rings", "platinum", 700.0),
        ];
        for (id, name, cat, mat, price) in rows {
            store.upsert_item(&item(id, name, cat, mat, price, None)).unwrap();
        }
        store
    }

    #[test]
    fn indices_are_validated_and_padded() {
        assert_eq!(pick_indices("3, 1, 99, x, 3", 8, 7), vec![2, 0, 1, 3, 4, 5, 6]);
        assert_eq!(pick_indices("", 3, 7), vec![0, 1, 2]);
        assert_eq!(pick_indices("8,7,6,5,4,3,2,1", 8, 7), vec![7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn profiles() {
        assert_eq!(shopper_profile(None, &[]), "New visitor - show diverse bestsellers.");
        let viewed = vec![item("a", "Aurora Ring", "rings", "gold", 500.0, None), item("b", "Bella", "rings", "silver", 300.0, None)];
        let guest = shopper_profile(None, &viewed);
        assert!(guest.starts_with("Guest browsing. STRONG PREFERENCE for: rings. Materials: gold, silver."));
        assert!(guest.contains("Price range: $300-$500 (avg: $400)"));
        let user = UserContext { user_id: "u".into(), total_orders: 4, ..Default::default() };
        assert!(shopper_profile(Some(&user), &viewed).starts_with("Returning customer! Orders: 4."));
    }

    #[tokio::test]
    async fn model_picks_are_served_in_order() {
        let provider = ScriptedProvider::new("openai").reply_text("8, 2");
        let requests = provider.requests();
        let store = catalog();
        let rec = Recommender::new(Arc::new(cascade_of(vec![provider])), store, ScoringEngine::default());

        let picks = rec.recommend(&BehaviorSignal::default(), None).await.unwrap();
        assert_eq!(picks.len(), 7);
        assert_eq!(picks[0].name, "Halo Ring");
        assert_eq!(picks[1].name, "Bella Band");
        assert_eq!(requests.lock()[0].max_tokens, Some(50));
    }

    #[tokio::test]
    async fn exhausted_cascade_falls_back_to_scoring() {
        let provider = ScriptedProvider::new("openai").fail(ProviderError::Transport("down".into()));
        let rec = Recommender::new(Arc::new(cascade_of(vec![provider])), catalog(), ScoringEngine::default());
        let signal = BehaviorSignal { viewed: vec!["b".into()], ..Default::default() };

        let picks = rec.recommend(&signal, None).await.unwrap();
        // Bella Band itself is penalised; another ring leads.
        assert!(["Aurora Ring", "Halo Ring"].contains(&picks[0].name.as_str()));
        assert_ne!(picks[0].id, "b");
    }

    #[tokio::test]
    async fn analysis_mentions_are_resolved() {
        let rec = Recommender::new(Arc::new(cascade_of(vec![])), catalog(), ScoringEngine::default());
        let picks = rec
            .recommend_from_analysis("Try the [11111111-1111-1111-1111-111111111111] piece with the Cleo Chain.")
            .await
            .unwrap();
        let names: Vec<&str> = picks.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Aurora Ring") && names.contains(&"Cleo Chain"));

        let fallback = rec.recommend_from_analysis("nothing specific").await.unwrap();
        assert_eq!(fallback.len(), 6);
    }
}
