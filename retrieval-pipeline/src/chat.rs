use tracing::{info, instrument};

use common::{
    error::AppError,
    storage::{
        sessions::SessionStore,
        store::StorageManager,
        types::session::{ChatTurn, SessionKey},
    },
    utils::{
        embedding::EmbeddingProvider, llm::CompletionProvider, session_locks::SessionLocks,
    },
};

use crate::{cache::PipelineCache, RetrievalConfig};

pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful study assistant.";

/// Builds the fixed completion prompt from retrieved context and the question.
pub fn build_chat_prompt(context: &[String], question: &str) -> String {
    format!(
        "Answer the question based on the following context:\n\n\
         Context: {}\n\n\
         Question: {question}\n\n\
         Answer:",
        context.join("\n\n")
    )
}

/// Answers one question against a session's documents.
///
/// Resolves the cached pipeline (building it from the persisted index on a
/// miss), retrieves the top-k chunks, invokes the completion provider, then
/// records the exchange in the session transcript. The transcript append
/// happens on every successful answer, including the first.
#[instrument(skip_all, fields(user_id, session_id))]
#[allow(clippy::too_many_arguments)]
pub async fn answer_question(
    storage: &StorageManager,
    sessions: &SessionStore,
    cache: &PipelineCache,
    locks: &SessionLocks,
    embedder: &EmbeddingProvider,
    completer: &CompletionProvider,
    config: RetrievalConfig,
    user_id: &str,
    session_id: &str,
    question: &str,
) -> Result<String, AppError> {
    // Confirms ownership and existence before any provider spend.
    sessions.get_session(user_id, session_id).await?;

    let key = SessionKey::new(user_id, session_id);
    let pipeline = cache.get_or_build(storage, config, &key).await?;

    let context = pipeline.retrieve(embedder, question).await?;
    let prompt = build_chat_prompt(&context, question);
    let answer = completer
        .complete(CHAT_SYSTEM_PROMPT, &prompt, config.chat_max_tokens)
        .await?;

    // The transcript append is a read-modify-write on the session record;
    // the per-session lock keeps concurrent chat turns from losing updates.
    let lock = locks.lock_for(&key);
    let _guard = lock.lock().await;

    let mut session = sessions.get_session(user_id, session_id).await?;
    session
        .chat_history
        .push(ChatTurn::new(question.to_owned(), answer.clone()));
    session.message_count += 1;
    session.touch();
    sessions.save(&session).await?;

    info!(
        user_id,
        session_id,
        retrieved = context.len(),
        message_count = session.message_count,
        "Answered chat question"
    );

    Ok(answer)
}
