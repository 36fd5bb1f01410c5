use std::sync::LazyLock;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            content::Content,
            content_link::{ContentLink, LinkType},
        },
    },
};
use regex::Regex;

static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]|]+)(?:\|([^\[\]]+))?\]\]").unwrap());
static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());
static FENCED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`\n]*`").unwrap());

/// A link found in a document body, before target resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub target: String,
    pub link_text: String,
    pub link_type: LinkType,
}

/// Extract wiki-links and internal markdown links, ignoring code blocks and
/// inline code. External markdown targets are skipped.
pub fn extract_links(content: &str) -> Vec<ExtractedLink> {
    let without_fences = FENCED_CODE_RE.replace_all(content, "");
    let cleaned = INLINE_CODE_RE.replace_all(&without_fences, "");

    let mut links: Vec<(usize, ExtractedLink)> = Vec::new();

    for caps in WIKI_LINK_RE.captures_iter(&cleaned) {
        let target = caps[1].trim().to_owned();
        if target.is_empty() {
            continue;
        }
        let link_text = caps
            .get(2)
            .map_or_else(|| target.clone(), |m| m.as_str().trim().to_owned());
        links.push((
            caps.get(0).map_or(0, |m| m.start()),
            ExtractedLink {
                target,
                link_text,
                link_type: LinkType::Wiki,
            },
        ));
    }

    for caps in MARKDOWN_LINK_RE.captures_iter(&cleaned) {
        let target = caps[2].trim().to_owned();
        if target.starts_with("http://")
            || target.starts_with("https://")
            || target.starts_with("//")
        {
            continue;
        }
        // Wiki syntax also matches the markdown pattern when display text is
        // present; skip anything already captured as wiki.
        let start = caps.get(0).map_or(0, |m| m.start());
        if cleaned[..start].ends_with('[') {
            continue;
        }
        links.push((
            start,
            ExtractedLink {
                target,
                link_text: caps[1].trim().to_owned(),
                link_type: LinkType::Markdown,
            },
        ));
    }

    links.sort_by_key(|(start, _)| *start);
    links.into_iter().map(|(_, link)| link).collect()
}

/// Replace the stored links of a content: delete everything for the source,
/// resolve wiki targets by exact title, insert the fresh set.
pub async fn store_links(
    content_id: &str,
    body: &str,
    db: &SurrealDbClient,
) -> Result<usize, AppError> {
    ContentLink::delete_by_source(content_id, db).await?;

    let extracted = extract_links(body);
    let count = extracted.len();

    for link in extracted {
        let target = match link.link_type {
            LinkType::Wiki => Content::find_by_title(&link.target, db)
                .await?
                .map(|content| content.id),
            // Markdown targets are file paths; they stay unresolved.
            LinkType::Markdown => None,
        };

        db.store_item(ContentLink::new(
            content_id.to_owned(),
            target,
            link.link_text,
            link.link_type,
        ))
        .await?;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn extracts_simple_wiki_link() {
        let links = extract_links("See [[Python]] for more info.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Python");
        assert_eq!(links[0].link_text, "Python");
        assert_eq!(links[0].link_type, LinkType::Wiki);
    }

    #[test]
    fn wiki_link_with_display_text() {
        let links = extract_links("Learn [[Python|the language]] here.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Python");
        assert_eq!(links[0].link_text, "the language");
    }

    #[test]
    fn wiki_link_with_spaces() {
        let links = extract_links("Check [[Getting Started]] guide.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Getting Started");
    }

    #[test]
    fn markdown_links_skip_external_targets() {
        let content = "\
            Internal: [local](./file.md)\n\
            External: [google](https://google.com)\n\
            Also external: [http](http://example.com)\n\
            Protocol relative: [cdn](//cdn.example.com)";
        let links = extract_links(content);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "./file.md");
        assert_eq!(links[0].link_text, "local");
        assert_eq!(links[0].link_type, LinkType::Markdown);
    }

    #[test]
    fn mixed_links_keep_document_order() {
        let content = "\
            Wiki link: [[Python]]\n\
            Markdown: [guide](./guide.md)\n\
            Another wiki: [[Django|framework]]\n\
            Another md: [readme](README.md)";
        let links = extract_links(content);

        assert_eq!(links.len(), 4);
        assert_eq!(links[0].target, "Python");
        assert_eq!(links[1].target, "./guide.md");
        assert_eq!(links[2].target, "Django");
        assert_eq!(links[2].link_text, "framework");
        assert_eq!(links[3].target, "README.md");
    }

    #[test]
    fn links_in_code_are_ignored() {
        let content = "\
Normal link: [[Python]]

```python
# This [[should not]] be extracted
url = \"[also ignored](./file.md)\"
```

Another normal: [[Valid]]

Inline code: `[[also ignored]]` and `[skipped](file.md)`";
        let links = extract_links(content);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "Python");
        assert_eq!(links[1].target, "Valid");
    }

    #[test]
    fn nested_brackets_break_wiki_links() {
        assert!(extract_links("Link: [[Title with [brackets] inside]]").is_empty());
        assert!(extract_links("Broken [[link without closing").is_empty());
    }

    #[tokio::test]
    async fn store_links_resolves_wiki_targets_and_replaces() {
        let database = &Uuid::new_v4().to_string();
        let db = common::storage::db::SurrealDbClient::memory("test_ns", database)
            .await
            .expect("memory db");

        let mut target = Content::new(
            "markdown".into(),
            "Python".into(),
            "text/markdown".into(),
            1,
            "notes/python.md".into(),
            "caller".into(),
            vec![],
            serde_json::json!({}),
        );
        target.id = "target-1".into();
        db.store_item(target).await.expect("store target");

        let count = store_links("src-1", "See [[Python]] and [[Missing]].", &db)
            .await
            .expect("store links");
        assert_eq!(count, 2);

        let links = ContentLink::get_by_source("src-1", &db).await.expect("get");
        assert_eq!(links.len(), 2);
        let resolved = links.iter().find(|l| l.link_text == "Python").expect("resolved");
        assert_eq!(resolved.target.as_deref(), Some("target-1"));
        let dangling = links.iter().find(|l| l.link_text == "Missing").expect("dangling");
        assert!(dangling.target.is_none());

        // A second run replaces rather than accumulates.
        store_links("src-1", "Only [[Python]] now.", &db)
            .await
            .expect("second run");
        let links = ContentLink::get_by_source("src-1", &db).await.expect("get");
        assert_eq!(links.len(), 1);
    }
}
