use text_splitter::{ChunkConfig, TextSplitter};

use common::error::AppError;

/// Character-based chunking bounds with fixed overlap between consecutive
/// chunks. Matches the tuning the retrieval side was built around.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkerSettings {
    pub fn from_app_config(config: &common::utils::config::AppConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// Splits `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Splits land on the largest semantic boundary (newlines before words
/// before hard cuts) that fits the budget, the trailing remainder is always
/// kept as a final shorter chunk, and the same input always yields the same
/// sequence. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, settings: ChunkerSettings) -> Result<Vec<String>, AppError> {
    if settings.chunk_size == 0 {
        return Err(AppError::Validation("chunk_size must be positive".into()));
    }
    if settings.chunk_overlap >= settings.chunk_size {
        return Err(AppError::Validation(format!(
            "chunk_overlap {} must be smaller than chunk_size {}",
            settings.chunk_overlap, settings.chunk_size
        )));
    }

    let config = ChunkConfig::new(settings.chunk_size)
        .with_overlap(settings.chunk_overlap)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;
    let splitter = TextSplitter::new(config);

    Ok(splitter
        .chunks(text)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(str::to_owned)
        .collect())
}
