use std::time::Duration;

use chrono::{DateTime, Utc};
use common::error::AppError;
use serde::Deserialize;

use super::RateGate;

const API_BASE: &str = "https://api.semanticscholar.org/graph/v1/paper";
const FIELDS: &str = "title,abstract,authors,year,citationCount,externalIds";

#[derive(Debug, Clone)]
pub struct ScholarPaperInfo {
    pub paper_id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PaperResponse {
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<AuthorEntry>,
    year: Option<i32>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    #[serde(rename = "externalIds", default)]
    external_ids: Option<ExternalIds>,
}

#[derive(Deserialize)]
struct AuthorEntry {
    name: Option<String>,
}

#[derive(Deserialize, Default)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

/// Semantic Scholar graph API client, rate-limited like the ArXiv fetcher.
pub struct SemanticScholarFetcher {
    client: reqwest::Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl SemanticScholarFetcher {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            gate: RateGate::new(Duration::from_secs(3)),
        }
    }

    /// Fetch a paper by id (`arXiv:2301.12345`, `DOI:...`, or the raw
    /// Semantic Scholar id). `Ok(None)` when the paper is unknown.
    pub async fn fetch_paper(&self, paper_id: &str) -> Result<Option<ScholarPaperInfo>, AppError> {
        self.gate.wait().await;

        let mut request = self
            .client
            .get(format!("{API_BASE}/{paper_id}"))
            .query(&[("fields", FIELDS)])
            .timeout(Duration::from_secs(30));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| AppError::UpstreamFetch(format!("semantic scholar fetch failed: {e}")))?;

        let body: PaperResponse = response.json().await?;
        let Some(title) = body.title.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        Ok(Some(ScholarPaperInfo {
            paper_id: paper_id.to_owned(),
            title,
            abstract_text: body.abstract_text,
            authors: body
                .authors
                .into_iter()
                .filter_map(|a| a.name)
                .collect(),
            year: body.year,
            citation_count: body.citation_count,
            doi: body.external_ids.and_then(|ids| ids.doi),
            fetched_at: Utc::now(),
        }))
    }
}
