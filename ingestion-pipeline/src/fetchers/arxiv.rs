use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::error::AppError;
use regex::Regex;

use super::RateGate;

const API_BASE: &str = "https://export.arxiv.org/api/query";
const ABSTRACT_CAP: usize = 500;

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").unwrap());
static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").unwrap());
static AUTHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<name>(.*?)</name>").unwrap());
static PUBLISHED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<published>([^<]+)</published>").unwrap());
static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<arxiv:doi[^>]*>(.*?)</arxiv:doi>").unwrap());

#[derive(Debug, Clone)]
pub struct ArxivPaperInfo {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// ArXiv export API client. The API asks for one request every 3 seconds;
/// the shared gate enforces it across concurrent jobs.
pub struct ArxivFetcher {
    client: reqwest::Client,
    gate: RateGate,
}

impl Default for ArxivFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArxivFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            gate: RateGate::new(Duration::from_secs(3)),
        }
    }

    pub async fn fetch_paper(&self, arxiv_id: &str) -> Result<Option<ArxivPaperInfo>, AppError> {
        self.gate.wait().await;

        let response = self
            .client
            .get(API_BASE)
            .query(&[("id_list", arxiv_id), ("max_results", "1")])
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::UpstreamFetch(format!("arxiv fetch failed: {e}")))?;

        let body = response.text().await?;
        Ok(parse_entry(arxiv_id, &body))
    }
}

fn parse_entry(arxiv_id: &str, atom: &str) -> Option<ArxivPaperInfo> {
    let entry = ENTRY_RE.captures(atom)?.get(1)?.as_str().to_owned();

    let title = TITLE_RE
        .captures(&entry)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(&unescape_xml(m.as_str())))?;
    // Entries without a resolvable id come back titled "Error".
    if title.is_empty() || title == "Error" {
        return None;
    }

    let abstract_text = SUMMARY_RE
        .captures(&entry)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(&unescape_xml(m.as_str())))
        .map(|mut text| {
            if text.chars().count() > ABSTRACT_CAP {
                text = text.chars().take(ABSTRACT_CAP).collect();
            }
            text
        });

    let authors = AUTHOR_RE
        .captures_iter(&entry)
        .filter_map(|c| c.get(1))
        .map(|m| collapse_whitespace(&unescape_xml(m.as_str())))
        .collect();

    let published_at = PUBLISHED_RE
        .captures(&entry)
        .and_then(|c| c.get(1))
        .and_then(|m| DateTime::parse_from_rfc3339(m.as_str().trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let doi = DOI_RE
        .captures(&entry)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_owned());

    Some(ArxivPaperInfo {
        arxiv_id: arxiv_id.to_owned(),
        title,
        authors,
        abstract_text,
        doi,
        published_at,
        fetched_at: Utc::now(),
    })
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>The dominant sequence transduction models are based on complex
      recurrent or convolutional neural networks.</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:doi xmlns:arxiv="http://arxiv.org/schemas/atom">10.1000/example</arxiv:doi>
  </entry>
</feed>"#;

    #[test]
    fn parses_entry_fields() {
        let paper = parse_entry("1706.03762", SAMPLE_ATOM).expect("parsed");

        assert_eq!(paper.title, "Attention Is All You Need");
        assert_eq!(paper.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert!(paper
            .abstract_text
            .as_deref()
            .expect("abstract")
            .starts_with("The dominant sequence"));
        assert_eq!(paper.doi.as_deref(), Some("10.1000/example"));
        assert!(paper.published_at.is_some());
    }

    #[test]
    fn missing_entry_returns_none() {
        let feed = r#"<feed><title>ArXiv Query Results</title></feed>"#;
        assert!(parse_entry("0000.00000", feed).is_none());
    }

    #[test]
    fn error_entry_returns_none() {
        let feed = r#"<feed><entry><title>Error</title><summary>bad id</summary></entry></feed>"#;
        assert!(parse_entry("bad", feed).is_none());
    }

    #[test]
    fn abstract_is_capped() {
        let long_summary = "word ".repeat(400);
        let feed = format!(
            "<feed><entry><title>Long</title><summary>{long_summary}</summary></entry></feed>"
        );
        let paper = parse_entry("x", &feed).expect("parsed");
        assert!(paper.abstract_text.expect("abstract").chars().count() <= ABSTRACT_CAP);
    }
}
