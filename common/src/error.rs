use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Blob store error: {0}")]
    Blob(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Upstream fetch error: {0}")]
    UpstreamFetch(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

/// Pipeline failure tagged with the stage it happened in, so the job record
/// can carry `(error_stage, error_code, error_message)`.
#[derive(Error, Debug, Clone)]
#[error("[{stage}] {code}: {message}")]
pub struct StageError {
    pub stage: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl StageError {
    pub fn new(stage: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let mut message = message.into();
        // Keep job rows bounded; upstream errors can embed whole response bodies.
        if message.len() > 500 {
            message.truncate(500);
        }
        Self {
            stage,
            code,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_truncates_long_messages() {
        let err = StageError::new("llm_call", "LLM_CALL_ERROR", "x".repeat(2000));
        assert_eq!(err.message.len(), 500);
        assert_eq!(err.stage, "llm_call");
    }

    #[test]
    fn stage_error_display_includes_stage_and_code() {
        let err = StageError::new("parse", "EMPTY_RESPONSE", "empty response for content:1");
        assert_eq!(
            err.to_string(),
            "[parse] EMPTY_RESPONSE: empty response for content:1"
        );
    }
}
