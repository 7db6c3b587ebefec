// ── Vector storage & similarity ────────────────────────────────────────────
// Embeddings are stored as little-endian f32 BLOBs. Nearest-neighbour search
// is a linear cosine scan in Rust over the candidate rows.

/// BLOB → vector. Trailing bytes that do not form a whole f32 are ignored.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Vector → BLOB.
pub fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Cosine similarity in f64. Mismatched lengths, empty or zero vectors → 0.0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |(d, na, nb), (x, y)| {
        let (x, y) = (*x as f64, *y as f64);
        (d + x * y, na + x * x, nb + y * y)
    });
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

/// Score `rows` against `query`, keep those at or above `threshold`, best
/// first, at most `limit`.
pub(crate) fn rank_by_similarity<T>(
    query: &[f32],
    rows: impl IntoIterator<Item = (T, Vec<u8>)>,
    threshold: f64,
    limit: usize,
) -> Vec<(T, f64)> {
    let mut scored: Vec<(T, f64)> = rows
        .into_iter()
        .filter_map(|(row, blob)| {
            let score = cosine_similarity(query, &bytes_to_f32_vec(&blob));
            (score >= threshold).then_some((row, score))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}
