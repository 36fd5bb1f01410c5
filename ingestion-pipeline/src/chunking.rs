use common::{error::AppError, llm::Embedder};
use text_splitter::{ChunkCapacity, ChunkConfig, TextSplitter};

const CHUNK_MIN_CHARS: usize = 500;
const CHUNK_MAX_CHARS: usize = 2_000;
const CHUNK_OVERLAP_CHARS: usize = 100;

/// Split a content body into chunk texts. Empty bodies produce no chunks.
pub fn split_text(text: &str) -> Result<Vec<String>, AppError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let capacity = ChunkCapacity::new(CHUNK_MIN_CHARS)
        .with_max(CHUNK_MAX_CHARS)
        .map_err(|e| AppError::Validation(format!("invalid chunk bounds: {e}")))?;
    let config = ChunkConfig::new(capacity)
        .with_overlap(CHUNK_OVERLAP_CHARS)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;
    let splitter = TextSplitter::new(config);

    Ok(splitter.chunks(text).map(str::to_owned).collect())
}

/// Split and embed a body, returning `(text, embedding)` pairs ready for
/// `Chunk::replace_for_content`.
pub async fn embed_chunks(
    text: &str,
    embedder: &dyn Embedder,
) -> Result<Vec<(String, Vec<f32>)>, AppError> {
    let pieces = split_text(text)?;

    let mut embedded = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let embedding = embedder.embed(&piece).await?;
        embedded.push((piece, embedding));
    }
    Ok(embedded)
}
