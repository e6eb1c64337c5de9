//! Maximal marginal relevance re-ranking.
//!
//! Given a query vector and candidate vectors, selects up to `k` candidates
//! that are similar to the query but dissimilar to each other:
//!
//! 1. Pick the candidate most similar to the query.
//! 2. Repeatedly pick the unselected candidate maximising
//!    `λ × sim(query, c) − (1 − λ) × max sim(c, selected)`.
//!
//! `λ = 1.0` reduces to plain similarity ranking; `λ = 0.0` ignores the
//! query after the first pick. Ties keep the earlier candidate, so the
//! result is deterministic for a given input order.

use crate::embedding::cosine_similarity;

/// Indices into `embeddings`, in selection order.
pub fn maximal_marginal_relevance(
    query: &[f32],
    embeddings: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let limit = k.min(embeddings.len());
    if limit == 0 {
        return Vec::new();
    }

    let to_query: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(query, e))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(limit);
    // Highest similarity to anything already selected, per candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; embeddings.len()];

    let first = argmax(to_query.iter().copied().enumerate());
    selected.push(first);

    while selected.len() < limit {
        let last = selected[selected.len() - 1];
        for (i, slot) in redundancy.iter_mut().enumerate() {
            let sim = cosine_similarity(embeddings[i], embeddings[last]);
            if sim > *slot {
                *slot = sim;
            }
        }

        let scores = to_query
            .iter()
            .enumerate()
            .filter(|(i, _)| !selected.contains(i))
            .map(|(i, q)| (i, lambda * q - (1.0 - lambda) * redundancy[i]));
        selected.push(argmax(scores));
    }

    selected
}

/// First index with the strictly greatest score.
fn argmax(scores: impl Iterator<Item = (usize, f32)>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    let mut seen = false;
    for (i, s) in scores {
        if !seen || s > best.1 {
            best = (i, s);
            seen = true;
        }
    }
    best.0
}
