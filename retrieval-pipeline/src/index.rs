use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{
    error::AppError,
    storage::store::{index_key, StorageManager},
    utils::embedding::EmbeddingProvider,
};

/// Bump when the on-disk index shape changes incompatibly.
pub const INDEX_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    INDEX_FORMAT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Per-session similarity-searchable store of chunk vectors.
///
/// Append-only: ingestion adds entries, nothing ever rewrites or removes
/// individual chunks. Persisted as one self-describing JSON blob per session
/// and replaced atomically on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingIndex {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub backend: String,
    pub dimension: usize,
    entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    /// Loads a persisted index. Absence is the expected state before the
    /// first upload and is not an error.
    pub async fn load(
        storage: &StorageManager,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let key = index_key(user_id, session_id);
        let Some(bytes) = storage.get_opt(&key).await? else {
            return Ok(None);
        };

        let index: Self = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Decode(format!("invalid embedding index: {e}")))?;
        if index.format_version > INDEX_FORMAT_VERSION {
            return Err(AppError::Decode(format!(
                "embedding index format version {} is newer than supported {}",
                index.format_version, INDEX_FORMAT_VERSION
            )));
        }
        Ok(Some(index))
    }

    /// Embeds `chunks` and builds a fresh index. Nothing is persisted here,
    /// so a provider failure leaves no partial index behind.
    pub async fn from_chunks(
        embedder: &EmbeddingProvider,
        chunks: Vec<String>,
    ) -> Result<Self, AppError> {
        let mut index = Self {
            format_version: INDEX_FORMAT_VERSION,
            backend: embedder.backend_label().to_owned(),
            dimension: embedder.dimension(),
            entries: Vec::new(),
        };
        index.add_chunks(embedder, chunks).await?;
        Ok(index)
    }

    /// Embeds and appends `chunks`, leaving every prior entry untouched.
    pub async fn add_chunks(
        &mut self,
        embedder: &EmbeddingProvider,
        chunks: Vec<String>,
    ) -> Result<(), AppError> {
        let embeddings = embedder.embed_batch(chunks.clone()).await?;
        self.entries.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(text, embedding)| IndexEntry { text, embedding }),
        );
        Ok(())
    }

    /// Up to `k` chunk texts ranked by cosine similarity, best first.
    ///
    /// An empty query is the whole-document escape hatch: it returns up to
    /// `k` stored chunks in insertion order without consulting the embedding
    /// provider. Best-effort dump, not semantic search.
    pub async fn similarity_search(
        &self,
        embedder: &EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, AppError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if query.trim().is_empty() {
            return Ok(self
                .entries
                .iter()
                .take(k)
                .map(|entry| entry.text.clone())
                .collect());
        }

        let query_embedding = embedder.embed(query).await?;

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_embedding, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            candidates = scored.len(),
            k, "Ranked index entries for query"
        );

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, entry)| entry.text.clone())
            .collect())
    }

    /// Every stored chunk, in insertion order. Whole-document consumers use
    /// this instead of the empty-query search.
    pub fn all_chunks(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically replaces the persisted blob for this session.
    pub async fn persist(
        &self,
        storage: &StorageManager,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), AppError> {
        let key = index_key(user_id, session_id);
        let bytes = serde_json::to_vec(self)?;
        storage.put(&key, Bytes::from(bytes)).await
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
