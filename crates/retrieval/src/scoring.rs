//! Pure scoring and ranking helpers

use std::collections::HashSet;

use queryloom_core::ScoredItem;

/// Lowercased alphanumeric tokens of a text.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Fraction of query tokens that appear in the item's tokens.
pub fn lexical_overlap(query_tokens: &HashSet<String>, item_tokens: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let overlap = query_tokens.intersection(item_tokens).count();
    overlap as f64 / query_tokens.len() as f64
}

/// Cosine similarity of two vectors; 0.0 for mismatched lengths or a
/// zero vector (a zero vector would otherwise poison results with NaN).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Sort a result set into its final ranked order.
///
/// Score descending; ties break by recency (`created_at` descending),
/// then kind precedence (`query_pattern > business_rule > table_metadata
/// > learning`), then id, so the order is total and deterministic.
pub fn rank(results: &mut [ScoredItem]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.item.created_at().cmp(&a.item.created_at()))
            .then_with(|| b.item.kind_rank().cmp(&a.item.kind_rank()))
            .then_with(|| a.item.id().cmp(b.item.id()))
    });
}
