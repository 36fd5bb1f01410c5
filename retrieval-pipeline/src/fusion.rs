use std::collections::HashMap;

use crate::RetrievedSource;

/// RRF smoothing constant.
pub const RRF_K: f32 = 60.0;

/// Fuse ranked lists with Reciprocal Rank Fusion: each appearance at
/// 0-based rank `r` contributes `1 / (k + r)`. The first-seen record of a
/// source is kept; its score becomes the accumulated RRF score.
pub fn rrf_fuse(ranked_lists: Vec<Vec<RetrievedSource>>, limit: usize) -> Vec<RetrievedSource> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut first_seen: HashMap<String, RetrievedSource> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for list in ranked_lists {
        for (rank, source) in list.into_iter().enumerate() {
            let contribution = 1.0 / (RRF_K + rank as f32);
            match scores.get_mut(&source.id) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(source.id.clone(), contribution);
                    order.push(source.id.clone());
                    first_seen.insert(source.id.clone(), source);
                }
            }
        }
    }

    // Stable order for ties: first appearance across the lists.
    let mut fused: Vec<RetrievedSource> = order
        .into_iter()
        .filter_map(|id| {
            let mut source = first_seen.remove(&id)?;
            source.score = *scores.get(&id)?;
            Some(source)
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused
}
