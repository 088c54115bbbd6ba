use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),
    #[error("Completion provider error: {0}")]
    CompletionProvider(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("No documents uploaded yet: {0}")]
    NoDocuments(String),
    #[error("No extractable text: {0}")]
    NoExtractableText(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
