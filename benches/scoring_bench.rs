// Instant-recommendation scoring over catalogs of increasing size.

use auraluxe_engine::engine::scoring::{ScoringEngine, ScoringSignal};
use auraluxe_engine::engine::types::CatalogItem;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const CATEGORIES: [&str; 5] = ["rings", "necklaces", "earrings", "bracelets", "watches"];
const MATERIALS: [&str; 4] = ["gold", "silver", "platinum", "pearl"];

fn catalog(n: usize) -> Vec<CatalogItem> {
    (0..n)
        .map(|i| CatalogItem {
            id: format!("p{}", i),
            name: format!("Piece {}", i),
            category: CATEGORIES[i % CATEGORIES.len()].into(),
            material: MATERIALS[i % MATERIALS.len()].into(),
            price: 50.0 + (i % 40) as f64 * 25.0,
            description: None,
            image_urls: vec![],
            video_url: None,
            image_360_url: None,
            stock: 1,
        })
        .collect()
}

fn rank_benchmark(c: &mut Criterion) {
    let engine = ScoringEngine::default();
    let mut group = c.benchmark_group("scoring_rank");
    for size in [100usize, 1_000, 10_000] {
        let items = catalog(size);
        let viewed: Vec<CatalogItem> = items.iter().step_by(size / 10).cloned().collect();
        let favorites: Vec<String> = items.iter().take(5).map(|i| i.id.clone()).collect();
        let cart: Vec<String> = items.iter().skip(5).take(3).map(|i| i.id.clone()).collect();
        let signal = ScoringSignal { viewed: &viewed, favorites: &favorites, cart: &cart };

        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| engine.rank(black_box(items), black_box(&signal)))
        });
    }
    group.finish();
}

criterion_group!(benches, rank_benchmark);
criterion_main!(benches);
