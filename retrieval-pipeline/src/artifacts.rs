use bytes::Bytes;
use chrono::Utc;
use tracing::{info, instrument};

use common::{
    error::AppError,
    storage::{sessions::SessionStore, store::artifact_key, store::StorageManager},
    utils::llm::CompletionProvider,
};

use crate::index::EmbeddingIndex;

/// Study artifacts generated from a session's whole document corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Notes,
    PracticeTest,
}

impl ArtifactKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::PracticeTest => "practice_test",
        }
    }

    fn prompt(self, corpus: &str) -> String {
        match self {
            Self::Notes => format!(
                "You are a helpful assistant. Please convert the following text into clear, \
                 concise, and easy-to-understand notes that would be ideal for a student \
                 studying for a test. Focus on key concepts, important details, and summaries \
                 that aid in quick revision and understanding.\n\nText:\n{corpus}"
            ),
            Self::PracticeTest => {
                format!("Create practice questions based on these notes: \n\n{corpus}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub text: String,
    pub file_name: String,
}

/// Generates notes or a practice test from everything indexed for a session
/// and persists it as a downloadable Markdown artifact.
///
/// Reads the index directly rather than through the pipeline cache: this is
/// a whole-corpus dump, not a top-k retrieval.
#[instrument(skip_all, fields(user_id, session_id, kind = kind.file_stem()))]
pub async fn generate_artifact(
    storage: &StorageManager,
    sessions: &SessionStore,
    completer: &CompletionProvider,
    kind: ArtifactKind,
    user_id: &str,
    session_id: &str,
    context_chars: usize,
    max_tokens: u32,
) -> Result<GeneratedArtifact, AppError> {
    sessions.get_session(user_id, session_id).await?;

    let index = EmbeddingIndex::load(storage, user_id, session_id)
        .await?
        .ok_or_else(|| {
            AppError::NoDocuments(format!(
                "no documents uploaded yet for session {session_id}"
            ))
        })?;

    let corpus = bounded_corpus(&index, context_chars);
    let prompt = kind.prompt(&corpus);
    let text = completer
        .complete("You are a helpful study assistant.", &prompt, max_tokens)
        .await?;

    let file_name = format!(
        "{}_{}_{}_{}.md",
        kind.file_stem(),
        user_id,
        session_id,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    storage
        .put(&artifact_key(&file_name), Bytes::from(text.clone().into_bytes()))
        .await?;

    info!(user_id, session_id, file_name, "Generated study artifact");
    Ok(GeneratedArtifact { text, file_name })
}

// Joins every chunk and caps the result so the prompt stays within the
// completion provider's context budget.
fn bounded_corpus(index: &EmbeddingIndex, context_chars: usize) -> String {
    let joined = index.all_chunks().collect::<Vec<_>>().join("\n\n");
    if joined.chars().count() <= context_chars {
        return joined;
    }
    let mut capped: String = joined.chars().take(context_chars).collect();
    capped.push_str("...");
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::{
        config::{AppConfig, StorageKind},
        embedding::EmbeddingProvider,
    };

    async fn fixture() -> (StorageManager, SessionStore, CompletionProvider) {
        let cfg = AppConfig {
            storage: StorageKind::Memory,
            ..AppConfig::default()
        };
        let storage = StorageManager::new(&cfg).await.unwrap();
        let sessions = SessionStore::new(storage.clone());
        (storage, sessions, CompletionProvider::new_echo())
    }

    #[tokio::test]
    async fn generates_and_persists_notes() {
        let (storage, sessions, completer) = fixture().await;
        let session = sessions.create_session("alice", None).await.unwrap();

        let embedder = EmbeddingProvider::new_hashed(32);
        let index = EmbeddingIndex::from_chunks(
            &embedder,
            vec!["Osmosis moves water across membranes.".into()],
        )
        .await
        .unwrap();
        index
            .persist(&storage, "alice", &session.session_id)
            .await
            .unwrap();

        let artifact = generate_artifact(
            &storage,
            &sessions,
            &completer,
            ArtifactKind::Notes,
            "alice",
            &session.session_id,
            12_000,
            2000,
        )
        .await
        .unwrap();

        assert!(artifact.text.contains("Osmosis"));
        assert!(artifact.file_name.starts_with("notes_alice_"));
        assert!(artifact.file_name.ends_with(".md"));

        let stored = storage.get(&artifact_key(&artifact.file_name)).await.unwrap();
        assert_eq!(stored.as_ref(), artifact.text.as_bytes());
    }

    #[tokio::test]
    async fn artifact_without_documents_reports_no_documents() {
        let (storage, sessions, completer) = fixture().await;
        let session = sessions.create_session("alice", None).await.unwrap();

        let result = generate_artifact(
            &storage,
            &sessions,
            &completer,
            ArtifactKind::PracticeTest,
            "alice",
            &session.session_id,
            12_000,
            1000,
        )
        .await;
        assert!(matches!(result, Err(AppError::NoDocuments(_))));
    }

    #[tokio::test]
    async fn corpus_is_capped_with_ellipsis() {
        let embedder = EmbeddingProvider::new_hashed(16);
        let chunks: Vec<String> = (0..20).map(|i| format!("chunk {i} {}", "x".repeat(50))).collect();
        let index = EmbeddingIndex::from_chunks(&embedder, chunks).await.unwrap();

        let corpus = bounded_corpus(&index, 100);
        assert_eq!(corpus.chars().count(), 103);
        assert!(corpus.ends_with("..."));
    }

    #[test]
    fn prompts_differ_by_kind() {
        assert!(ArtifactKind::Notes.prompt("BODY").contains("notes"));
        assert!(ArtifactKind::PracticeTest
            .prompt("BODY")
            .contains("practice questions"));
    }
}
