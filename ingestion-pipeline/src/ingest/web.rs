use std::net::IpAddr;
use std::time::Duration;

use common::error::AppError;
use dom_smoothie::{Article, Readability, TextMode};
use tracing::{info, warn};

/// An extracted web page: title plus markdown body.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub title: String,
    pub markdown: String,
}

/// Fetch a page and run readability extraction in markdown mode.
pub async fn extract_page(client: &reqwest::Client, url: &str) -> Result<ExtractedPage, AppError> {
    let parsed =
        url::Url::parse(url).map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
    ensure_ingestion_url_allowed(&parsed)?;

    let started = std::time::Instant::now();
    let raw_html = client
        .get(url)
        .timeout(Duration::from_secs(30))
        .send()
        .await?
        .error_for_status()
        .map_err(|e| AppError::UpstreamFetch(format!("page fetch failed: {e}")))?
        .text()
        .await?;

    let config = dom_smoothie::Config {
        text_mode: TextMode::Markdown,
        ..Default::default()
    };
    let mut readability = Readability::new(raw_html, Some(url), Some(config))
        .map_err(|e| AppError::UpstreamFetch(format!("readability init failed: {e}")))?;
    let article: Article = readability
        .parse()
        .map_err(|e| AppError::UpstreamFetch(format!("article extraction failed: {e}")))?;

    info!(%url, elapsed_ms = started.elapsed().as_millis() as u64, "extracted web page");

    Ok(ExtractedPage {
        title: article.title,
        markdown: article.text_content.into(),
    })
}

fn ensure_ingestion_url_allowed(url: &url::Url) -> Result<(), AppError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            warn!(%url, %scheme, "rejected ingestion URL due to unsupported scheme");
            return Err(AppError::Validation(
                "Unsupported URL scheme for ingestion".to_string(),
            ));
        }
    }

    let Some(host) = url.host_str() else {
        return Err(AppError::Validation(
            "URL is missing a host component".to_string(),
        ));
    };

    if host.eq_ignore_ascii_case("localhost") {
        warn!(%url, host, "rejected ingestion URL to localhost");
        return Err(AppError::Validation(
            "Ingestion URL host is not allowed".to_string(),
        ));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        let is_disallowed = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        };

        if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || is_disallowed {
            warn!(%url, host, %ip, "rejected ingestion URL pointing to restricted network range");
            return Err(AppError::Validation(
                "Ingestion URL host is not allowed".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_scheme() {
        let url = url::Url::parse("ftp://example.com").expect("url");
        assert!(ensure_ingestion_url_allowed(&url).is_err());
    }

    #[test]
    fn rejects_localhost_and_private_ranges() {
        for raw in [
            "http://localhost/resource",
            "http://127.0.0.1/x",
            "http://192.168.1.10/index.html",
            "http://10.0.0.5/",
            "http://169.254.1.1/",
        ] {
            let url = url::Url::parse(raw).expect("url");
            assert!(ensure_ingestion_url_allowed(&url).is_err(), "{raw}");
        }
    }

    #[test]
    fn allows_public_hosts() {
        let url = url::Url::parse("https://sub.example.com/path").expect("url");
        assert!(ensure_ingestion_url_allowed(&url).is_ok());
    }
}
