use chrono::{DateTime, Utc};
use common::error::AppError;
use serde::Deserialize;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::debug;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "knowledge-ingest/1.0";

#[derive(Debug, Clone)]
pub struct GithubRepoInfo {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    full_name: String,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

pub struct GithubFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl GithubFetcher {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Fetch repository metadata. `Ok(None)` for missing repos; rate-limit
    /// responses are retried with exponential backoff before giving up.
    pub async fn fetch_repo(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Option<GithubRepoInfo>, AppError> {
        let url = format!("{API_BASE}/repos/{owner}/{repo}");

        let strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);
        let response = Retry::spawn(strategy, || async {
            let mut request = self
                .client
                .get(&url)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/vnd.github+json")
                .timeout(std::time::Duration::from_secs(30));
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(AppError::from)?;
            let status = response.status();
            if status.as_u16() == 403 || status.as_u16() == 429 {
                debug!(%url, %status, "github rate limited, backing off");
                return Err(AppError::UpstreamFetch(format!(
                    "github rate limited: {status}"
                )));
            }
            Ok(response)
        })
        .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| AppError::UpstreamFetch(format!("github fetch failed: {e}")))?;

        let body: RepoResponse = response.json().await?;
        Ok(Some(GithubRepoInfo {
            name: body.name,
            full_name: body.full_name,
            description: body.description,
            stars: body.stargazers_count,
            language: body.language,
            topics: body.topics,
            fetched_at: Utc::now(),
        }))
    }
}
