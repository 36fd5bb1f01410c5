use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{chunk::Chunk, content::Content},
    },
};

use crate::{RetrievedSource, SearchFilters};

const SNIPPET_CAP: usize = 500;

/// Vector search over chunks, collapsed to at most one hit per content (the
/// highest-similarity chunk supplies the snippet), hydrated with content
/// titles and types.
pub async fn search_by_embedding(
    db: &SurrealDbClient,
    embedding: Vec<f32>,
    limit: usize,
    filters: &SearchFilters,
) -> Result<Vec<RetrievedSource>, AppError> {
    // Over-fetch so the per-content collapse still fills the limit.
    let hits = Chunk::vector_search(
        embedding,
        limit * 2,
        filters.content_type.as_deref(),
        filters.tier_min.as_deref(),
        db,
    )
    .await?;

    // Hits arrive ordered by score, so the first per content is its best.
    let mut best_per_content: Vec<(String, f32, String)> = Vec::new();
    let mut seen: HashMap<String, ()> = HashMap::new();
    for hit in hits {
        if seen.contains_key(&hit.content_id) {
            continue;
        }
        seen.insert(hit.content_id.clone(), ());
        best_per_content.push((hit.content_id, hit.score, hit.text));
    }
    best_per_content.truncate(limit);

    let mut sources = Vec::with_capacity(best_per_content.len());
    for (content_id, score, text) in best_per_content {
        let content = db.get_item::<Content>(&content_id).await?;
        let snippet = if text.is_empty() {
            None
        } else {
            Some(text.chars().take(SNIPPET_CAP).collect())
        };
        sources.push(RetrievedSource {
            id: content_id,
            content_type: content
                .as_ref()
                .map_or_else(|| "unknown".to_owned(), |c| c.content_type.clone()),
            title: content.map(|c| c.title),
            score,
            snippet,
        });
    }

    Ok(sources)
}
