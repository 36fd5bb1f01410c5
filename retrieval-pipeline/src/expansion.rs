use std::time::Duration;

use common::llm::{GenerateOptions, Generator};
use serde::Deserialize;
use tracing::debug;

const MAX_QUERIES: usize = 5;

#[derive(Deserialize)]
struct ExpansionResponse {
    #[serde(default)]
    queries: Vec<String>,
}

fn expansion_prompt(query: &str) -> String {
    format!(
        r#"Generate 3-5 diverse search queries to find relevant content.
Return JSON: {{"queries": ["query1", "query2", ...]}}
Focus on different aspects and synonyms to maximize recall.

Original question: {query}

Return only JSON, no other text."#
    )
}

/// Expand a query into alternative phrasings. Any failure degrades to the
/// original query alone; the original is always first in the result.
pub async fn expand_query(generator: &dyn Generator, query: &str) -> Vec<String> {
    let response = match generator
        .generate(
            &expansion_prompt(query),
            GenerateOptions {
                temperature: 0.3,
                max_tokens: 512,
                timeout: Duration::from_secs(30),
            },
        )
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "query expansion failed, using original query");
            return vec![query.to_owned()];
        }
    };

    parse_expansion(&response, query)
}

fn parse_expansion(response: &str, original: &str) -> Vec<String> {
    let trimmed = response.trim();
    let candidate = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim_start_matches(['\r', '\n']).trim_end_matches('`').trim()
    } else {
        trimmed
    };

    let Ok(parsed) = serde_json::from_str::<ExpansionResponse>(candidate) else {
        return vec![original.to_owned()];
    };

    let mut queries: Vec<String> = parsed
        .queries
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .collect();
    if queries.is_empty() {
        return vec![original.to_owned()];
    }

    if !queries.iter().any(|q| q == original) {
        queries.insert(0, original.to_owned());
    }
    queries.truncate(MAX_QUERIES);
    queries
}
