use tracing::{info, instrument};

use common::{
    error::AppError,
    storage::{
        sessions::SessionStore,
        store::StorageManager,
        types::{document::DocumentRecord, session::SessionKey},
    },
    utils::{embedding::EmbeddingProvider, session_locks::SessionLocks},
};
use retrieval_pipeline::{cache::PipelineCache, index::EmbeddingIndex};

use crate::chunker::{chunk_text, ChunkerSettings};

/// One uploaded document after text extraction.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub record: DocumentRecord,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub records: Vec<DocumentRecord>,
    pub chunks_added: usize,
    pub index_len: usize,
}

/// Folds a batch of extracted documents into a session's embedding index.
///
/// Chunks each text, embeds and appends into the index (creating it on the
/// first upload), persists the index, appends manifest records, and evicts
/// the session's cached pipeline. The whole operation runs under the
/// per-session lock so two uploads to one session cannot interleave their
/// load-append-persist sequences.
#[instrument(skip_all, fields(user_id, session_id, documents = documents.len()))]
#[allow(clippy::too_many_arguments)]
pub async fn ingest_documents(
    storage: &StorageManager,
    sessions: &SessionStore,
    cache: &PipelineCache,
    locks: &SessionLocks,
    embedder: &EmbeddingProvider,
    chunker: ChunkerSettings,
    user_id: &str,
    session_id: &str,
    documents: Vec<ExtractedDocument>,
) -> Result<IngestOutcome, AppError> {
    let key = SessionKey::new(user_id, session_id);
    let lock = locks.lock_for(&key);
    let _guard = lock.lock().await;

    let mut session = sessions.get_session(user_id, session_id).await?;

    let mut chunks = Vec::new();
    for document in &documents {
        chunks.extend(chunk_text(&document.text, chunker)?);
    }
    if chunks.is_empty() {
        return Err(AppError::NoExtractableText(
            "no text could be extracted from the uploaded files".into(),
        ));
    }
    let chunks_added = chunks.len();

    let index = match EmbeddingIndex::load(storage, user_id, session_id).await? {
        Some(mut index) => {
            index.add_chunks(embedder, chunks).await?;
            index
        }
        None => EmbeddingIndex::from_chunks(embedder, chunks).await?,
    };
    index.persist(storage, user_id, session_id).await?;

    let records: Vec<DocumentRecord> = documents
        .into_iter()
        .map(|document| document.record)
        .collect();
    session.documents.extend(records.iter().cloned());
    session.touch();
    sessions.save(&session).await?;

    // Evicted after the persist above, so the next lookup sees the new blob.
    cache.invalidate(&key).await;

    info!(
        user_id,
        session_id,
        chunks_added,
        index_len = index.len(),
        "Ingested document batch"
    );

    Ok(IngestOutcome {
        records,
        chunks_added,
        index_len: index.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use common::{
        storage::types::document::DocumentKind,
        utils::config::{AppConfig, StorageKind},
    };
    use object_store::{memory::InMemory, throttle::ThrottleConfig, throttle::ThrottledStore};
    use retrieval_pipeline::RetrievalConfig;

    struct IngestFixture {
        storage: StorageManager,
        sessions: SessionStore,
        cache: Arc<PipelineCache>,
        locks: Arc<SessionLocks>,
        embedder: EmbeddingProvider,
    }

    impl IngestFixture {
        fn with_storage(storage: StorageManager) -> Self {
            Self {
                sessions: SessionStore::new(storage.clone()),
                storage,
                cache: Arc::new(PipelineCache::new()),
                locks: Arc::new(SessionLocks::new()),
                embedder: EmbeddingProvider::new_hashed(64),
            }
        }

        async fn new() -> Self {
            let cfg = AppConfig {
                storage: StorageKind::Memory,
                ..AppConfig::default()
            };
            Self::with_storage(StorageManager::new(&cfg).await.unwrap())
        }

        /// Memory storage with artificial latency on every call, to widen
        /// the window in which racing load-append-persist sequences could
        /// lose updates.
        async fn slow() -> Self {
            let throttle = ThrottleConfig {
                wait_put_per_call: std::time::Duration::from_millis(20),
                wait_get_per_call: std::time::Duration::from_millis(20),
                ..ThrottleConfig::default()
            };
            let store = ThrottledStore::new(InMemory::new(), throttle);
            Self::with_storage(StorageManager::with_backend(
                Arc::new(store),
                StorageKind::Memory,
            ))
        }

        async fn ingest(
            &self,
            session_id: &str,
            documents: Vec<ExtractedDocument>,
        ) -> Result<IngestOutcome, AppError> {
            ingest_documents(
                &self.storage,
                &self.sessions,
                &self.cache,
                &self.locks,
                &self.embedder,
                ChunkerSettings::default(),
                "alice",
                session_id,
                documents,
            )
            .await
        }
    }

    fn document(name: &str, text: &str) -> ExtractedDocument {
        ExtractedDocument {
            record: DocumentRecord::new(
                format!("{name}.pdf"),
                format!("{name}_stored.pdf"),
                DocumentKind::Pdf,
            ),
            text: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn first_upload_creates_the_index() {
        let fixture = IngestFixture::new().await;
        let session = fixture.sessions.create_session("alice", None).await.unwrap();

        let outcome = fixture
            .ingest(
                &session.session_id,
                vec![document("cell", "Mitochondria is the powerhouse of the cell.\n")],
            )
            .await
            .unwrap();

        assert_eq!(outcome.chunks_added, 1);
        assert_eq!(outcome.index_len, 1);
        assert_eq!(outcome.records.len(), 1);

        let reloaded = fixture
            .sessions
            .get_session("alice", &session.session_id)
            .await
            .unwrap();
        assert_eq!(reloaded.documents.len(), 1);
        assert_eq!(reloaded.documents[0].filename, "cell.pdf");
        assert!(reloaded.updated_at >= session.updated_at);
    }

    #[tokio::test]
    async fn sequential_uploads_grow_the_index_monotonically() {
        let fixture = IngestFixture::new().await;
        let session = fixture.sessions.create_session("alice", None).await.unwrap();

        for (name, text) in [
            ("first", "Protons live in the nucleus."),
            ("second", "Electrons orbit the nucleus."),
            ("third", "Neutrons carry no charge."),
        ] {
            fixture
                .ingest(&session.session_id, vec![document(name, text)])
                .await
                .unwrap();
        }

        let index = EmbeddingIndex::load(&fixture.storage, "alice", &session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.len(), 3);

        let everything = index
            .similarity_search(&fixture.embedder, "", 100)
            .await
            .unwrap();
        for fragment in ["Protons", "Electrons", "Neutrons"] {
            assert!(
                everything.iter().any(|chunk| chunk.contains(fragment)),
                "missing chunk for {fragment}"
            );
        }

        let reloaded = fixture
            .sessions
            .get_session("alice", &session.session_id)
            .await
            .unwrap();
        assert_eq!(reloaded.documents.len(), 3);
    }

    #[tokio::test]
    async fn whitespace_only_batch_is_rejected_without_mutation() {
        let fixture = IngestFixture::new().await;
        let session = fixture.sessions.create_session("alice", None).await.unwrap();

        let result = fixture
            .ingest(&session.session_id, vec![document("empty", "  \n\t ")])
            .await;
        assert!(matches!(result, Err(AppError::NoExtractableText(_))));

        let index = EmbeddingIndex::load(&fixture.storage, "alice", &session.session_id)
            .await
            .unwrap();
        assert!(index.is_none());

        let reloaded = fixture
            .sessions
            .get_session("alice", &session.session_id)
            .await
            .unwrap();
        assert!(reloaded.documents.is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let fixture = IngestFixture::new().await;
        let result = fixture
            .ingest("missing", vec![document("doc", "some text")])
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn ingestion_invalidates_the_cached_pipeline() {
        let fixture = IngestFixture::new().await;
        let session = fixture.sessions.create_session("alice", None).await.unwrap();
        let key = SessionKey::new("alice", session.session_id.clone());

        fixture
            .ingest(&session.session_id, vec![document("first", "Original content.")])
            .await
            .unwrap();

        let stale = fixture
            .cache
            .get_or_build(&fixture.storage, RetrievalConfig::default(), &key)
            .await
            .unwrap();
        assert_eq!(stale.index().len(), 1);

        fixture
            .ingest(&session.session_id, vec![document("second", "Freshly uploaded content.")])
            .await
            .unwrap();

        // A chat immediately after the upload must see the new content.
        let fresh = fixture
            .cache
            .get_or_build(&fixture.storage, RetrievalConfig::default(), &key)
            .await
            .unwrap();
        assert_eq!(fresh.index().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_uploads_to_one_session_lose_nothing() {
        let fixture = Arc::new(IngestFixture::slow().await);
        let session = fixture.sessions.create_session("alice", None).await.unwrap();

        let mut handles = Vec::new();
        for name in ["left", "right"] {
            let fixture = Arc::clone(&fixture);
            let session_id = session.session_id.clone();
            handles.push(tokio::spawn(async move {
                fixture
                    .ingest(
                        &session_id,
                        vec![document(name, &format!("Unique content from {name} upload."))],
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let index = EmbeddingIndex::load(&fixture.storage, "alice", &session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.len(), 2);
        let everything: Vec<&str> = index.all_chunks().collect();
        assert!(everything.iter().any(|chunk| chunk.contains("left")));
        assert!(everything.iter().any(|chunk| chunk.contains("right")));

        let reloaded = fixture
            .sessions
            .get_session("alice", &session.session_id)
            .await
            .unwrap();
        assert_eq!(reloaded.documents.len(), 2);
    }
}
