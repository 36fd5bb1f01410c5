use std::sync::Arc;

use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;

use crate::error::AppError;

/// Embedding capability. One instance is built at startup with a fixed
/// model and dimensionality so every stored vector stays comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> u32;

    async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;
}

pub struct OpenAiEmbedder {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbedder {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    ) -> Self {
        Self {
            client,
            model,
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> u32 {
        self.dimensions
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimensions)
            .input([input])
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding = response
            .data
            .first()
            .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))?
            .embedding
            .clone();

        Ok(embedding)
    }
}
