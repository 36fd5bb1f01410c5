use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Source kinds a URL can classify into. Everything unrecognized is `Web`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlKind {
    Youtube,
    GithubRepo,
    Arxiv,
    Pypi,
    Npm,
    Doi,
    Web,
}

impl UrlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::Youtube => "youtube",
            UrlKind::GithubRepo => "github_repo",
            UrlKind::Arxiv => "arxiv",
            UrlKind::Pypi => "pypi",
            UrlKind::Npm => "npm",
            UrlKind::Doi => "doi",
            UrlKind::Web => "web",
        }
    }
}

/// A URL found in text or submitted for ingestion, with its stable
/// identifier extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedUrl {
    pub url: String,
    pub kind: UrlKind,
    pub extracted_id: String,
}

static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://(?:www\.)?(?:youtube\.com/watch\?[^\s]*?v=|youtu\.be/|youtube\.com/embed/)([A-Za-z0-9_-]{11})",
    )
    .unwrap()
});

static GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)").unwrap()
});

static ARXIV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://(?:www\.)?arxiv\.org/abs/(\d{4}\.\d{4,5}(?:v\d+)?)").unwrap());

static ARXIV_LEGACY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://(?:www\.)?arxiv\.org/abs/([a-z-]+(?:\.[A-Z]{2})?/\d{7})").unwrap());

static PYPI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://pypi\.org/project/([A-Za-z0-9._-]+)").unwrap());

static NPM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?npmjs\.com/package/(@[A-Za-z0-9._-]+/[A-Za-z0-9._-]+|[A-Za-z0-9._-]+)")
        .unwrap()
});

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://(?:www\.)?doi\.org/(10\.\d{4,9}/[^\s\]]+)").unwrap());

/// Query parameters that never contribute to a page's identity.
const EXPLICIT_TRACKING_PARAMS: &[&str] = &[
    "gbraid",
    "wbraid",
    "mc_cid",
    "mc_eid",
    "hsenc",
    "_hsmi",
    "hsctatracking",
];

/// Classify a single submitted URL into exactly one kind.
pub fn classify_url(url: &str) -> DetectedUrl {
    if let Some(caps) = YOUTUBE_RE.captures(url) {
        return DetectedUrl {
            url: url.to_string(),
            kind: UrlKind::Youtube,
            extracted_id: caps[1].to_string(),
        };
    }
    if let Some(detected) = detect_one(url) {
        return detected;
    }
    DetectedUrl {
        url: url.to_string(),
        kind: UrlKind::Web,
        extracted_id: url.to_string(),
    }
}

fn detect_one(url: &str) -> Option<DetectedUrl> {
    if let Some(caps) = GITHUB_RE.captures(url) {
        let owner = &caps[1];
        let repo = caps[2].trim_end_matches(".git");
        // Reserved single-segment paths are not repositories.
        if !matches!(owner, "orgs" | "topics" | "collections" | "features" | "sponsors") {
            return Some(DetectedUrl {
                url: format!("https://github.com/{owner}/{repo}"),
                kind: UrlKind::GithubRepo,
                extracted_id: format!("{owner}/{repo}"),
            });
        }
    }
    if let Some(caps) = ARXIV_RE.captures(url).or_else(|| ARXIV_LEGACY_RE.captures(url)) {
        return Some(DetectedUrl {
            url: format!("https://arxiv.org/abs/{}", &caps[1]),
            kind: UrlKind::Arxiv,
            extracted_id: caps[1].to_string(),
        });
    }
    if let Some(caps) = DOI_RE.captures(url) {
        let id = caps[1].trim_end_matches(['.', ',', ';']);
        return Some(DetectedUrl {
            url: format!("https://doi.org/{id}"),
            kind: UrlKind::Doi,
            extracted_id: id.to_string(),
        });
    }
    if let Some(caps) = PYPI_RE.captures(url) {
        return Some(DetectedUrl {
            url: format!("https://pypi.org/project/{}", &caps[1]),
            kind: UrlKind::Pypi,
            extracted_id: caps[1].to_string(),
        });
    }
    if let Some(caps) = NPM_RE.captures(url) {
        let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        return Some(DetectedUrl {
            url: full.trim_end_matches('/').to_string(),
            kind: UrlKind::Npm,
            extracted_id: caps[1].to_string(),
        });
    }
    None
}

/// Scan free text for entity-bearing URLs (repos, papers, packages, DOIs).
/// Plain web URLs are not reported; they carry no entity identity.
pub fn detect_urls(text: &str) -> Vec<DetectedUrl> {
    let mut found = Vec::new();

    for caps in GITHUB_RE.captures_iter(text) {
        let owner = &caps[1];
        let repo = caps[2].trim_end_matches(".git");
        if matches!(owner, "orgs" | "topics" | "collections" | "features" | "sponsors") {
            continue;
        }
        push_unique(
            &mut found,
            DetectedUrl {
                url: format!("https://github.com/{owner}/{repo}"),
                kind: UrlKind::GithubRepo,
                extracted_id: format!("{owner}/{repo}"),
            },
        );
    }
    for caps in ARXIV_RE.captures_iter(text) {
        push_unique(
            &mut found,
            DetectedUrl {
                url: format!("https://arxiv.org/abs/{}", &caps[1]),
                kind: UrlKind::Arxiv,
                extracted_id: caps[1].to_string(),
            },
        );
    }
    for caps in DOI_RE.captures_iter(text) {
        let id = caps[1].trim_end_matches(['.', ',', ';', ')']);
        // Keep balanced parentheses: only trim a trailing ')' that has no
        // matching '(' inside the identifier.
        let id = if id.matches('(').count() > id.matches(')').count() {
            caps[1].trim_end_matches(['.', ',', ';'])
        } else {
            id
        };
        push_unique(
            &mut found,
            DetectedUrl {
                url: format!("https://doi.org/{id}"),
                kind: UrlKind::Doi,
                extracted_id: id.to_string(),
            },
        );
    }
    for caps in PYPI_RE.captures_iter(text) {
        push_unique(
            &mut found,
            DetectedUrl {
                url: format!("https://pypi.org/project/{}", &caps[1]),
                kind: UrlKind::Pypi,
                extracted_id: caps[1].to_string(),
            },
        );
    }
    for caps in NPM_RE.captures_iter(text) {
        let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        push_unique(
            &mut found,
            DetectedUrl {
                url: full.trim_end_matches('/').to_string(),
                kind: UrlKind::Npm,
                extracted_id: caps[1].to_string(),
            },
        );
    }

    found
}

fn push_unique(found: &mut Vec<DetectedUrl>, detected: DetectedUrl) {
    if !found
        .iter()
        .any(|d| d.kind == detected.kind && d.extracted_id == detected.extracted_id)
    {
        found.push(detected);
    }
}

fn is_tracking_param(key: &str) -> bool {
    let lowered = key.to_lowercase();
    lowered.starts_with("utm_")
        || lowered.ends_with("clid")
        || EXPLICIT_TRACKING_PARAMS.contains(&lowered.as_str())
}

/// Deterministically canonicalize a web URL for dedup: lowercased host with
/// `www.` stripped, non-default port preserved, trailing slash removed
/// except at the root, tracking parameters dropped, remaining query pairs
/// sorted, fragment discarded.
pub fn canonicalize_web_url(raw: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(raw)?;

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut netloc = host;
    if let Some(port) = parsed.port() {
        netloc = format!("{netloc}:{port}");
    }

    let mut path = parsed.path().to_string();
    if path != "/" && !path.is_empty() && path.ends_with('/') {
        path = path.trim_end_matches('/').to_string();
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &pairs {
            serializer.append_pair(key, value);
        }
        format!("?{}", serializer.finish())
    };

    Ok(format!("{}://{netloc}{path}{query}", parsed.scheme()))
}

/// Domain-stable dedup key: `yt:<video_id>` for YouTube sources.
pub fn youtube_resource_key(video_id: &str) -> String {
    format!("yt:{video_id}")
}

/// Domain-stable dedup key for web pages: `url:<sha256(canonical)>`.
pub fn web_resource_key(canonical_url: &str) -> String {
    let digest = Sha256::digest(canonical_url.as_bytes());
    format!("url:{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_youtube_url_forms() {
        for raw in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?list=PL123&v=dQw4w9WgXcQ",
        ] {
            let detected = classify_url(raw);
            assert_eq!(detected.kind, UrlKind::Youtube, "for {raw}");
            assert_eq!(detected.extracted_id, "dQw4w9WgXcQ");
        }
    }

    #[test]
    fn classifies_everything_else_as_web() {
        let detected = classify_url("https://stackoverflow.com/questions/12345");
        assert_eq!(detected.kind, UrlKind::Web);
    }

    #[test]
    fn detects_github_repo_variants() {
        let text = "\
            Check out https://github.com/python/cpython for details.\n\
            See https://github.com/owner/repo/ for code.\n\
            Link: https://github.com/other/repo2/blob/main/README.md\n\
            Clone https://github.com/git-org/cloned.git\n\
            Visit https://github.com/q/params?tab=readme";
        let urls = detect_urls(text);

        let ids: Vec<&str> = urls.iter().map(|u| u.extracted_id.as_str()).collect();
        assert!(ids.contains(&"python/cpython"));
        assert!(ids.contains(&"owner/repo"));
        assert!(ids.contains(&"other/repo2"));
        assert!(ids.contains(&"git-org/cloned"));
        assert!(ids.contains(&"q/params"));
        assert!(urls
            .iter()
            .all(|u| u.kind == UrlKind::GithubRepo && !u.url.contains("/blob/")));
    }

    #[test]
    fn detects_arxiv_with_version() {
        let urls = detect_urls("Paper: https://arxiv.org/abs/2301.12345v2 and https://arxiv.org/abs/1234.56789");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].extracted_id, "2301.12345v2");
        assert_eq!(urls[1].extracted_id, "1234.56789");
        assert!(urls.iter().all(|u| u.kind == UrlKind::Arxiv));
    }

    #[test]
    fn detects_doi_trims_sentence_punctuation() {
        let urls = detect_urls("See https://doi.org/10.1234/example. And https://doi.org/10.1000/xyz123(abc)def");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].extracted_id, "10.1234/example");
        assert_eq!(urls[1].extracted_id, "10.1000/xyz123(abc)def");
    }

    #[test]
    fn detects_scoped_npm_packages() {
        let urls = detect_urls("Install https://npmjs.com/package/@types/node and https://www.npmjs.com/package/express/");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].extracted_id, "@types/node");
        assert_eq!(urls[1].extracted_id, "express");
        assert_eq!(urls[1].url, "https://www.npmjs.com/package/express");
    }

    #[test]
    fn detects_pypi_packages() {
        let urls = detect_urls("Install from https://pypi.org/project/python-dateutil and https://pypi.org/project/requests?tab=files");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].extracted_id, "python-dateutil");
        assert_eq!(urls[1].extracted_id, "requests");
        assert_eq!(urls[1].url, "https://pypi.org/project/requests");
    }

    #[test]
    fn ignores_lookalike_hosts() {
        let text = "\
            https://notgithub.com/owner/repo\n\
            https://notarxiv.org/abs/1234.5678\n\
            https://example.com and https://google.com";
        assert!(detect_urls(text).is_empty());
    }

    #[test]
    fn deduplicates_repeated_detections() {
        let text = "https://github.com/a/b then again https://github.com/a/b/issues";
        let urls = detect_urls(text);
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn canonicalization_normalizes_host_and_query() {
        let canonical =
            canonicalize_web_url("https://WWW.Example.com/path/?b=2&utm_source=abc&A=1#frag")
                .expect("parse");
        assert_eq!(canonical, "https://example.com/path?A=1&b=2");

        let same = canonicalize_web_url("https://example.com/path?A=1&b=2").expect("parse");
        assert_eq!(canonical, same);
    }

    #[test]
    fn canonicalization_preserves_root_and_port() {
        assert_eq!(
            canonicalize_web_url("https://example.com/").expect("parse"),
            "https://example.com/"
        );
        assert_eq!(
            canonicalize_web_url("https://example.com:8443/a/").expect("parse"),
            "https://example.com:8443/a"
        );
        // Default ports are dropped by the parser.
        assert_eq!(
            canonicalize_web_url("https://example.com:443/a").expect("parse"),
            "https://example.com/a"
        );
    }

    #[test]
    fn canonicalization_strips_explicit_tracking_params() {
        let canonical = canonicalize_web_url(
            "https://example.com/p?gclid=1&fbclid=2&gbraid=3&mc_cid=4&keep=yes",
        )
        .expect("parse");
        assert_eq!(canonical, "https://example.com/p?keep=yes");
    }

    #[test]
    fn identical_canonical_urls_share_resource_keys() {
        let a = canonicalize_web_url("https://www.Example.com/p/?utm_campaign=x&z=1").expect("a");
        let b = canonicalize_web_url("https://example.com/p?z=1").expect("b");
        assert_eq!(a, b);
        assert_eq!(web_resource_key(&a), web_resource_key(&b));
        assert!(web_resource_key(&a).starts_with("url:"));
    }

    #[test]
    fn youtube_resource_key_uses_video_id() {
        assert_eq!(youtube_resource_key("dQw4w9WgXcQ"), "yt:dQw4w9WgXcQ");
    }
}
