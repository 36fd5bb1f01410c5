use std::time::Duration;

use common::llm::{GenerateOptions, Generator};
use tracing::debug;

use crate::RetrievedSource;

const SNIPPET_CAP: usize = 400;

fn synthesis_prompt(query: &str, sources: &[RetrievedSource]) -> String {
    let formatted: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let title = source.title.as_deref().unwrap_or("Untitled");
            let snippet: String = source
                .snippet
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(SNIPPET_CAP)
                .collect();
            format!("[{}] {title}\n{snippet}", index + 1)
        })
        .collect();

    format!(
        r#"Based on the following search results, answer the user's question.
Include citations using [1], [2] etc. for each source used.
If the results don't contain relevant information, say so.

Question: {query}

Search Results:
{results}

Provide a comprehensive answer with citations."#,
        results = formatted.join("\n\n")
    )
}

/// Produce a cited answer over the reranked sources. Empty results or a
/// failing generator yield an empty answer rather than an error.
pub async fn synthesize(
    generator: &dyn Generator,
    query: &str,
    sources: &[RetrievedSource],
) -> String {
    if sources.is_empty() {
        return String::new();
    }

    match generator
        .generate(
            &synthesis_prompt(query, sources),
            GenerateOptions {
                temperature: 0.5,
                max_tokens: 2048,
                timeout: Duration::from_secs(60),
            },
        )
        .await
    {
        Ok(answer) => answer.trim().to_owned(),
        Err(e) => {
            debug!(error = %e, "answer synthesis failed");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::error::AppError;

    fn source(id: &str, title: Option<&str>, snippet: &str) -> RetrievedSource {
        RetrievedSource {
            id: id.to_owned(),
            content_type: "web".into(),
            title: title.map(str::to_owned),
            score: 0.5,
            snippet: Some(snippet.to_owned()),
        }
    }

    #[test]
    fn prompt_numbers_sources_from_one() {
        let prompt = synthesis_prompt(
            "what is tokio?",
            &[
                source("a", Some("Tokio Guide"), "Tokio is an async runtime."),
                source("b", None, "Schedulers and reactors."),
            ],
        );

        assert!(prompt.contains("[1] Tokio Guide\nTokio is an async runtime."));
        assert!(prompt.contains("[2] Untitled\nSchedulers and reactors."));
        assert!(prompt.contains("Question: what is tokio?"));
    }

    #[test]
    fn prompt_truncates_long_snippets() {
        let long = "x".repeat(1000);
        let prompt = synthesis_prompt("q", &[source("a", Some("T"), &long)]);
        assert!(!prompt.contains(&long));
        assert!(prompt.contains(&"x".repeat(SNIPPET_CAP)));
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _: &str, _: GenerateOptions) -> Result<String, AppError> {
            Err(AppError::InternalError("down".into()))
        }
    }

    #[tokio::test]
    async fn empty_sources_yield_empty_answer() {
        let answer = synthesize(&FailingGenerator, "q", &[]).await;
        assert!(answer.is_empty());
    }

    #[tokio::test]
    async fn generator_failure_yields_empty_answer() {
        let answer = synthesize(&FailingGenerator, "q", &[source("a", None, "text")]).await;
        assert!(answer.is_empty());
    }
}
