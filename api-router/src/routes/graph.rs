use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use common::storage::types::{content::Content, content_link::ContentLink};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct GraphView {
    pub nodes: Vec<Content>,
    pub edges: Vec<ContentLink>,
}

#[derive(Debug, Deserialize)]
pub struct GraphParams {
    #[serde(default = "default_node_limit")]
    pub limit: usize,
}

fn default_node_limit() -> usize {
    500
}

/// The full link graph, bounded by a node limit. Only links whose endpoints
/// are both in the node set (or dangling) are included.
pub async fn graph(
    State(state): State<ApiState>,
    Query(params): Query<GraphParams>,
) -> Result<Json<GraphView>, ApiError> {
    let nodes = Content::list(
        common::storage::types::content::ContentFilter {
            limit: params.limit.min(2000),
            ..Default::default()
        },
        &state.db,
    )
    .await?;

    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let edges = ContentLink::list(params.limit.min(2000) * 4, &state.db)
        .await?
        .into_iter()
        .filter(|link| {
            node_ids.contains(link.source.as_str())
                && link
                    .target
                    .as_deref()
                    .is_none_or(|target| node_ids.contains(target))
        })
        .collect();

    Ok(Json(GraphView { nodes, edges }))
}

#[derive(Debug, Deserialize)]
pub struct NeighborhoodParams {
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    1
}

/// Local neighborhood around a content node, following links in both
/// directions for up to `depth` hops (1..=3).
pub async fn neighborhood(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<NeighborhoodParams>,
) -> Result<Json<GraphView>, ApiError> {
    if !(1..=3).contains(&params.depth) {
        return Err(ApiError::ValidationError(
            "depth must be between 1 and 3".to_string(),
        ));
    }

    let center = state
        .db
        .get_item::<Content>(&id)
        .await
        .map_err(common::error::AppError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("content {id}")))?;

    let mut visited: HashMap<String, Content> = HashMap::new();
    visited.insert(id.clone(), center);
    let mut edges: HashMap<String, ContentLink> = HashMap::new();
    let mut frontier: HashSet<String> = HashSet::from([id]);

    for _ in 0..params.depth {
        let mut next_frontier = HashSet::new();

        for node_id in &frontier {
            let outgoing = ContentLink::get_by_source(node_id, &state.db).await?;
            for link in outgoing {
                if let Some(target) = link.target.clone() {
                    if !visited.contains_key(&target) {
                        if let Some(content) = state
                            .db
                            .get_item::<Content>(&target)
                            .await
                            .map_err(common::error::AppError::from)?
                        {
                            visited.insert(target.clone(), content);
                            next_frontier.insert(target);
                        }
                    }
                }
                edges.insert(link.id.clone(), link);
            }

            let incoming = ContentLink::get_by_target(node_id, &state.db).await?;
            for link in incoming {
                if !visited.contains_key(&link.source) {
                    if let Some(content) = state
                        .db
                        .get_item::<Content>(&link.source)
                        .await
                        .map_err(common::error::AppError::from)?
                    {
                        visited.insert(link.source.clone(), content);
                        next_frontier.insert(link.source.clone());
                    }
                }
                edges.insert(link.id.clone(), link);
            }
        }

        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    Ok(Json(GraphView {
        nodes: visited.into_values().collect(),
        edges: edges.into_values().collect(),
    }))
}
