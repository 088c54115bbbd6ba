use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::debug;

use common::{
    error::AppError,
    storage::{store::StorageManager, types::session::SessionKey},
    utils::embedding::EmbeddingProvider,
};

use crate::{index::EmbeddingIndex, RetrievalConfig};

/// A retriever bound to one session's loaded embedding index.
pub struct RetrievalPipeline {
    index: EmbeddingIndex,
    top_k: usize,
}

impl RetrievalPipeline {
    pub fn new(index: EmbeddingIndex, top_k: usize) -> Self {
        Self { index, top_k }
    }

    /// Top-k chunks for `question`, best match first.
    pub async fn retrieve(
        &self,
        embedder: &EmbeddingProvider,
        question: &str,
    ) -> Result<Vec<String>, AppError> {
        self.index
            .similarity_search(embedder, question, self.top_k)
            .await
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }
}

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Process-wide, session-keyed cache of ready-to-query pipelines.
///
/// Purely an optimization over rebuilding from the persisted index on every
/// chat turn: any entry may be evicted at any time without affecting
/// correctness. Ingestion invalidates the owning key after every index
/// mutation so the next lookup rebuilds from the fresh blob. Bounded:
/// exceeding the capacity evicts an arbitrary entry rather than growing
/// without limit.
pub struct PipelineCache {
    entries: RwLock<HashMap<SessionKey, Arc<RetrievalPipeline>>>,
    capacity: usize,
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the live pipeline for `key`, building one from the persisted
    /// index on a miss. A session with no index yet reports `NoDocuments`.
    pub async fn get_or_build(
        &self,
        storage: &StorageManager,
        config: RetrievalConfig,
        key: &SessionKey,
    ) -> Result<Arc<RetrievalPipeline>, AppError> {
        if let Some(pipeline) = self.entries.read().await.get(key) {
            return Ok(Arc::clone(pipeline));
        }

        let index = EmbeddingIndex::load(storage, &key.user_id, &key.session_id)
            .await?
            .ok_or_else(|| {
                AppError::NoDocuments(format!(
                    "no documents uploaded yet for session {}",
                    key.session_id
                ))
            })?;

        debug!(session = %key, entries = index.len(), "Built retrieval pipeline");
        let pipeline = Arc::new(RetrievalPipeline::new(index, config.top_k));

        // Two concurrent misses may both build; the later insert wins. Both
        // pipelines were built from the same persisted blob, so either is valid.
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            if let Some(victim) = entries.keys().next().cloned() {
                entries.remove(&victim);
            }
        }
        entries.insert(key.clone(), Arc::clone(&pipeline));

        Ok(pipeline)
    }

    /// Evicts the entry for `key`. The write lock orders the eviction after
    /// the index persist that triggered it, so later lookups rebuild.
    pub async fn invalidate(&self, key: &SessionKey) {
        if self.entries.write().await.remove(key).is_some() {
            debug!(session = %key, "Invalidated cached pipeline");
        }
    }

    /// Drops every cached pipeline.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
