use std::sync::Arc;
use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::warn;

use crate::error::AppError;

/// Per-call generation knobs. Timeouts are enforced here so every caller
/// gets a bounded suspension point.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Text-generation capability. Constructed once at startup and passed as a
/// value to the services that need it.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String, AppError>;
}

pub struct OpenAiGenerator {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: String,
    ) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(
                    "You are a precise assistant. Follow the output format exactly.",
                )
                .into(),
                ChatCompletionRequestUserMessage::from(prompt).into(),
            ])
            .temperature(options.temperature)
            .max_tokens(options.max_tokens)
            .build()?;

        let response = tokio::time::timeout(options.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                AppError::InternalError(format!(
                    "LLM call timed out after {}s",
                    options.timeout.as_secs()
                ))
            })??;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))?;

        Ok(content.clone())
    }
}

/// Wraps an ordered provider list and returns the first non-empty success.
/// Total failure carries a structured per-provider summary.
pub struct FallbackGenerator {
    providers: Vec<Arc<dyn Generator>>,
}

impl FallbackGenerator {
    pub fn new(providers: Vec<Arc<dyn Generator>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Generator for FallbackGenerator {
    fn model_name(&self) -> &str {
        "fallback_chain"
    }

    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String, AppError> {
        let mut failures = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match provider.generate(prompt, options.clone()).await {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {
                    warn!(model = provider.model_name(), "provider returned empty output");
                    failures.push(format!("{}: empty response", provider.model_name()));
                }
                Err(err) => {
                    warn!(model = provider.model_name(), error = %err, "provider failed");
                    failures.push(format!("{}: {err}", provider.model_name()));
                }
            }
        }

        Err(AppError::InternalError(format!(
            "all generation providers failed [{}]",
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedGenerator {
        name: &'static str,
        output: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.output {
                Ok(text) => Ok(text.to_owned()),
                Err(message) => Err(AppError::InternalError(message.to_owned())),
            }
        }
    }

    fn scripted(name: &'static str, output: Result<&'static str, &'static str>) -> Arc<ScriptedGenerator> {
        Arc::new(ScriptedGenerator {
            name,
            output,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn fallback_returns_first_non_empty_success() {
        let broken = scripted("broken", Err("connection refused"));
        let empty = scripted("empty", Ok("   "));
        let working = scripted("working", Ok("an answer"));
        let unused = scripted("unused", Ok("never seen"));

        let chain = FallbackGenerator::new(vec![
            broken.clone(),
            empty.clone(),
            working.clone(),
            unused.clone(),
        ]);

        let output = chain
            .generate("prompt", GenerateOptions::default())
            .await
            .expect("chain succeeds");

        assert_eq!(output, "an answer");
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
        assert_eq!(unused.calls.load(Ordering::SeqCst), 0, "chain stops at success");
    }

    #[tokio::test]
    async fn fallback_reports_every_provider_on_total_failure() {
        let chain = FallbackGenerator::new(vec![
            scripted("first", Err("boom")),
            scripted("second", Err("crash")),
        ]);

        let err = chain
            .generate("prompt", GenerateOptions::default())
            .await
            .expect_err("chain fails");

        let message = err.to_string();
        assert!(message.contains("first: "));
        assert!(message.contains("second: "));
    }
}
