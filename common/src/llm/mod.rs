pub mod embed;
pub mod generate;
pub mod rerank;

pub use embed::{Embedder, OpenAiEmbedder};
pub use generate::{FallbackGenerator, GenerateOptions, Generator, OpenAiGenerator};
pub use rerank::{HttpReranker, IdentityReranker, RankedDocument, Reranker};
