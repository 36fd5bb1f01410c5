use regex::Regex;
use url::Url;

/// Hosts that show up as video-sponsor or affiliate destinations.
const DEFAULT_SPONSORED_DOMAINS: &[&str] = &[
    "amazon.com",
    "audible.com",
    "brilliant.org",
    "expressvpn.com",
    "nordvpn.com",
    "skillshare.com",
    "squarespace.com",
];

/// Patterns matched case-insensitively against the whole URL.
const DEFAULT_SPONSORED_PATTERNS: &[&str] = &[
    r"utm_",
    r"[?&]ref=",
    r"affiliate=",
    r"sponsored",
    r"#ad\b",
    r"discount code",
    r"bit\.ly",
    r"amzn\.to",
    r"geni\.us",
    r"tinyurl\.com",
];

const AWS_CONTEXT_KEYWORDS: &[&str] = &["aws", "s3", "ec2", "lambda", "cloud"];

/// Flags affiliate, shortener, and tracking URLs so they are never promoted
/// to entities.
pub struct SponsoredFilter {
    domains: Vec<String>,
    patterns: Vec<Regex>,
}

impl Default for SponsoredFilter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SponsoredFilter {
    pub fn new(domains: Option<Vec<String>>, patterns: Option<Vec<String>>) -> Self {
        let domains = domains.unwrap_or_else(|| {
            DEFAULT_SPONSORED_DOMAINS
                .iter()
                .map(|d| (*d).to_owned())
                .collect()
        });
        let patterns = patterns
            .unwrap_or_else(|| {
                DEFAULT_SPONSORED_PATTERNS
                    .iter()
                    .map(|p| (*p).to_owned())
                    .collect()
            })
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
            .collect();

        Self { domains, patterns }
    }

    /// Whether a URL looks sponsored. `context` is the surrounding text; it
    /// only matters for the AWS carve-out on `amazon.com` hosts.
    pub fn is_sponsored_link(&self, url: &str, context: Option<&str>) -> bool {
        if url.is_empty() {
            return false;
        }

        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                let host = host.to_lowercase();
                let host = host.strip_prefix("www.").unwrap_or(&host);

                for domain in &self.domains {
                    if host == domain || host.ends_with(&format!(".{domain}")) {
                        if domain == "amazon.com" && self.is_aws_exception(host, context) {
                            return false;
                        }
                        return true;
                    }
                }
            }
        }

        self.patterns.iter().any(|p| p.is_match(url))
    }

    /// AWS properties live under `aws.amazon.com`; keep them when the text
    /// around the link actually talks about AWS.
    fn is_aws_exception(&self, host: &str, context: Option<&str>) -> bool {
        if !host.contains("aws") {
            return false;
        }
        let Some(context) = context else {
            return false;
        };
        let lowered = context.to_lowercase();
        AWS_CONTEXT_KEYWORDS.iter().any(|kw| lowered.contains(kw))
    }

    pub fn filter_urls<'a>(&self, urls: &'a [String], context: Option<&str>) -> Vec<&'a String> {
        urls.iter()
            .filter(|url| !self.is_sponsored_link(url, context))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> SponsoredFilter {
        SponsoredFilter::default()
    }

    #[test]
    fn amazon_links_are_sponsored_without_aws_context() {
        assert!(filter().is_sponsored_link("https://amazon.com/product?tag=affiliate123", None));
        assert!(filter().is_sponsored_link(
            "https://amazon.com/books/programming",
            Some("Check out these programming books")
        ));
        // Subdomains are caught too.
        assert!(filter().is_sponsored_link("https://shop.amazon.com/product", None));
    }

    #[test]
    fn aws_links_with_aws_context_are_kept() {
        let f = filter();
        assert!(!f.is_sponsored_link(
            "https://aws.amazon.com/s3/pricing/",
            Some("Learn about AWS S3 storage pricing")
        ));
        assert!(!f.is_sponsored_link(
            "https://docs.aws.amazon.com/lambda/latest/dg/welcome.html",
            Some("AWS Lambda documentation for serverless functions")
        ));
        for context in [
            "Using AWS Lambda functions",
            "Store files in S3 buckets",
            "Deploy EC2 instances",
            "Cloud computing with AWS",
        ] {
            assert!(!f.is_sponsored_link("https://aws.amazon.com/lambda/", Some(context)));
        }
        // The carve-out never applies to the retail site.
        assert!(f.is_sponsored_link("https://amazon.com/product", Some("Using AWS Lambda")));
    }

    #[test]
    fn shortener_hosts_are_sponsored() {
        let f = filter();
        for url in [
            "https://bit.ly/3xYz123",
            "https://amzn.to/3abc456",
            "https://geni.us/product123",
            "https://tinyurl.com/abc123",
        ] {
            assert!(f.is_sponsored_link(url, None), "{url}");
        }
    }

    #[test]
    fn tracking_and_affiliate_patterns_are_sponsored() {
        let f = filter();
        assert!(f.is_sponsored_link(
            "https://example.com/article?utm_source=newsletter&utm_campaign=promo",
            None
        ));
        assert!(f.is_sponsored_link("https://example.com/product?ref=influencer123", None));
        assert!(f.is_sponsored_link("https://example.com/product?affiliate=partner", None));
        assert!(f.is_sponsored_link("https://example.com/sponsored/content", None));
        assert!(f.is_sponsored_link("https://example.com/product#ad", None));
        assert!(f.is_sponsored_link("https://example.com/content?UTM_SOURCE=newsletter", None));
    }

    #[test]
    fn hash_ad_requires_word_boundary() {
        let f = filter();
        assert!(f.is_sponsored_link("https://example.com#ad", None));
        assert!(!f.is_sponsored_link("https://example.com#addon", None));
    }

    #[test]
    fn blocked_domains_are_sponsored() {
        let f = filter();
        assert!(f.is_sponsored_link("https://brilliant.org/3blue1brown", None));
        assert!(f.is_sponsored_link("https://www.brilliant.org/courses", None));
        assert!(f.is_sponsored_link("https://WWW.BRILLIANT.ORG/courses", None));
        assert!(f.is_sponsored_link("https://squarespace.com/templates", None));
        assert!(f.is_sponsored_link("https://skillshare.com/classes/python", None));
        assert!(f.is_sponsored_link("https://audible.com/audiobooks", None));
        // Exact domain semantics: lookalike hosts pass.
        assert!(!f.is_sponsored_link("https://not-amazon.com/x", None));
    }

    #[test]
    fn clean_links_pass() {
        let f = filter();
        assert!(!f.is_sponsored_link("https://github.com/python/cpython", None));
        assert!(!f.is_sponsored_link("https://example.com/search?q=python&page=2", None));
        assert!(!f.is_sponsored_link("not-a-valid-url", None));
        assert!(!f.is_sponsored_link("", None));
    }

    #[test]
    fn filter_urls_respects_context() {
        let urls = vec![
            "https://amazon.com/books".to_owned(),
            "https://aws.amazon.com/s3/".to_owned(),
            "https://amazon.com/shopping".to_owned(),
        ];
        let kept = filter().filter_urls(&urls, Some("AWS cloud storage solutions using S3"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0], "https://aws.amazon.com/s3/");
    }

    #[test]
    fn custom_domains_and_patterns_replace_defaults() {
        let custom = SponsoredFilter::new(
            Some(vec!["custom.com".to_owned()]),
            Some(vec![r"promo".to_owned()]),
        );
        assert!(custom.is_sponsored_link("https://custom.com/page", None));
        assert!(custom.is_sponsored_link("https://example.com/promo", None));
        assert!(!custom.is_sponsored_link("https://brilliant.org/x", None));
        assert!(!custom.is_sponsored_link("https://bit.ly/x", None));
    }
}
