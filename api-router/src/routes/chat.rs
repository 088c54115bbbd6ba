use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use retrieval_pipeline::chat::answer_question;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub question: Option<String>,
}

pub async fn chat(
    State(state): State<ApiState>,
    Json(input): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = input
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("user_id is required".into()))?;
    let session_id = input
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("session_id is required".into()))?;
    let question = input
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("No question provided".into()))?;

    let answer = answer_question(
        &state.storage,
        &state.sessions,
        &state.cache,
        &state.locks,
        &state.embedder,
        &state.completer,
        state.retrieval_config(),
        &user_id,
        &session_id,
        &question,
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "answer": answer,
            "session_id": session_id,
        })),
    ))
}

pub async fn chat_history(
    State(state): State<ApiState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_session(&user_id, &session_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "user_id": user_id,
            "session_id": session_id,
            "history": session.chat_history,
        })),
    ))
}
