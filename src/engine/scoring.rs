// Auraluxe Engine — Instant Recommendation Scoring
//
// Pure, synchronous ranking of catalog candidates against what the shopper
// has viewed, favourited and put in the cart. No I/O.

use crate::atoms::constants::*;
use crate::engine::types::CatalogItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub category: f64,
    pub material: f64,
    pub favorite: f64,
    pub in_cart: f64,
    pub price_band: f64,
    pub already_viewed: f64,
    /// Result size cap.
    pub limit: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            category: SCORE_CATEGORY_MATCH,
            material: SCORE_MATERIAL_MATCH,
            favorite: SCORE_FAVORITE,
            in_cart: SCORE_IN_CART,
            price_band: SCORE_PRICE_BAND,
            already_viewed: SCORE_ALREADY_VIEWED,
            limit: INSTANT_RECOMMENDATION_LIMIT,
        }
    }
}

/// Viewed items (fully resolved) plus favourite and cart ids.
#[derive(Debug, Clone, Copy)]
pub struct ScoringSignal<'a> {
    pub viewed: &'a [CatalogItem],
    pub favorites: &'a [String],
    pub cart: &'a [String],
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        ScoringEngine { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score every candidate. Output is parallel to `candidates`.
    pub fn score_all(&self, candidates: &[CatalogItem], signal: &ScoringSignal<'_>) -> Vec<f64> {
        let w = &self.weights;
        let categories: HashSet<&str> = signal.viewed.iter().map(|p| p.category.as_str()).collect();
        let materials: HashSet<&str> = signal.viewed.iter().map(|p| p.material.as_str()).collect();
        let viewed_ids: HashSet<&str> = signal.viewed.iter().map(|p| p.id.as_str()).collect();
        let favorites: HashSet<&str> = signal.favorites.iter().map(String::as_str).collect();
        let cart: HashSet<&str> = signal.cart.iter().map(String::as_str).collect();

        let mean_price = if signal.viewed.is_empty() {
            0.0
        } else {
            signal.viewed.iter().map(|p| p.price).sum::<f64>() / signal.viewed.len() as f64
        };

        candidates
            .iter()
            .map(|item| {
                let mut score = 0.0;
                if categories.contains(item.category.as_str()) {
                    score += w.category;
                }
                if materials.contains(item.material.as_str()) {
                    score += w.material;
                }
                if favorites.contains(item.id.as_str()) {
                    score += w.favorite;
                }
                if cart.contains(item.id.as_str()) {
                    score += w.in_cart;
                }
                if mean_price > 0.0 {
                    let delta = (item.price - mean_price).abs();
                    score += (w.price_band - w.price_band * delta / mean_price).max(0.0);
                }
                if viewed_ids.contains(item.id.as_str()) {
                    score += w.already_viewed;
                }
                score
            })
            .collect()
    }

    /// Highest-scoring candidates, at most `limit`. Ties keep candidate order.
    pub fn rank(&self, candidates: &[CatalogItem], signal: &ScoringSignal<'_>) -> Vec<CatalogItem> {
        let scores = self.score_all(candidates, signal);
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // sort_by is stable, so equal scores stay in input order.
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.into_iter().take(self.weights.limit).map(|i| candidates[i].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, category: &str, material: &str, price: f64) -> CatalogItem {
        CatalogItem {
            id: id.into(),
            name: id.into(),
            category: category.into(),
            material: material.into(),
            price,
            description: None,
            image_urls: vec![],
            video_url: None,
            image_360_url: None,
            stock: 1,
        }
    }

    fn signal<'a>(viewed: &'a [CatalogItem], favorites: &'a [String], cart: &'a [String]) -> ScoringSignal<'a> {
        ScoringSignal { viewed, favorites, cart }
    }

    #[test]
    fn category_and_material_overlap_wins() {
        let viewed = vec![item("ringA", "ring", "gold", 500.0)];
        let candidates = vec![item("braceletC", "bracelet", "silver", 500.0), item("ringB", "ring", "gold", 520.0)];
        let ranked = ScoringEngine::default().rank(&candidates, &signal(&viewed, &[], &[]));
        assert_eq!(ranked[0].id, "ringB");
    }

    #[test]
    fn price_band_decays_linearly() {
        let viewed = vec![item("v", "x", "y", 100.0)];
        let candidates = vec![item("a", "p", "q", 100.0), item("b", "p", "q", 150.0), item("c", "p", "q", 300.0)];
        let scores = ScoringEngine::default().score_all(&candidates, &signal(&viewed, &[], &[]));
        assert!((scores[0] - 20.0).abs() < 1e-9);
        assert!((scores[1] - 10.0).abs() < 1e-9);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn no_views_means_no_price_term() {
        let candidates = vec![item("a", "p", "q", 100.0)];
        let scores = ScoringEngine::default().score_all(&candidates, &signal(&[], &[], &[]));
        assert_eq!(scores, vec![0.0]);
    }

    #[test]
    fn viewed_items_sink_but_stay() {
        let viewed = vec![item("a", "ring", "gold", 100.0)];
        let candidates = vec![item("a", "ring", "gold", 100.0), item("b", "necklace", "pearl", 1.0)];
        let ranked = ScoringEngine::default().rank(&candidates, &signal(&viewed, &[], &[]));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].id, "a");
    }

    #[test]
    fn favorites_and_cart_add_points() {
        let candidates = vec![item("a", "p", "q", 1.0), item("b", "p", "q", 1.0), item("c", "p", "q", 1.0)];
        let favs = vec!["c".to_string()];
        let cart = vec!["b".to_string()];
        let ranked = ScoringEngine::default().rank(&candidates, &signal(&[], &favs, &cart));
        let ids: Vec<&str> = ranked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn ties_keep_input_order_and_cap_applies() {
        let candidates: Vec<CatalogItem> = (0..20).map(|i| item(&format!("p{}", i), "x", "y", 10.0)).collect();
        let ranked = ScoringEngine::default().rank(&candidates, &signal(&[], &[], &[]));
        assert_eq!(ranked.len(), INSTANT_RECOMMENDATION_LIMIT);
        assert_eq!(ranked[0].id, "p0");
        assert_eq!(ranked[13].id, "p13");
    }
}
