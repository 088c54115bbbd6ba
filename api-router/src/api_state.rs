use std::sync::Arc;

use common::{
    error::AppError,
    storage::{sessions::SessionStore, store::StorageManager},
    utils::{
        config::AppConfig, embedding::EmbeddingProvider, llm::CompletionProvider,
        session_locks::SessionLocks,
    },
};
use ingestion_pipeline::{chunker::ChunkerSettings, extraction::ExtractorSet};
use retrieval_pipeline::{cache::PipelineCache, RetrievalConfig};

/// Shared state behind every request handler. Cheap to clone; all mutable
/// pieces live behind their own synchronization.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub storage: StorageManager,
    pub sessions: SessionStore,
    pub cache: Arc<PipelineCache>,
    pub locks: Arc<SessionLocks>,
    pub embedder: Arc<EmbeddingProvider>,
    pub completer: Arc<CompletionProvider>,
    pub extractors: Arc<ExtractorSet>,
}

impl ApiState {
    pub async fn new(
        config: AppConfig,
        embedder: EmbeddingProvider,
        completer: CompletionProvider,
    ) -> Result<Self, AppError> {
        let storage = StorageManager::new(&config).await?;
        Ok(Self::with_storage(config, storage, embedder, completer))
    }

    /// Assembles state around an existing storage manager. Tests use this to
    /// inject in-memory or slowed-down backends.
    pub fn with_storage(
        config: AppConfig,
        storage: StorageManager,
        embedder: EmbeddingProvider,
        completer: CompletionProvider,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions: SessionStore::new(storage.clone()),
            storage,
            cache: Arc::new(PipelineCache::new()),
            locks: Arc::new(SessionLocks::new()),
            embedder: Arc::new(embedder),
            completer: Arc::new(completer),
            extractors: Arc::new(ExtractorSet::with_defaults()),
        }
    }

    pub fn chunker_settings(&self) -> ChunkerSettings {
        ChunkerSettings::from_app_config(&self.config)
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig::from_app_config(&self.config)
    }
}
