use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use common::storage::types::session::SessionKey;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: Option<String>,
    pub session_name: Option<String>,
}

pub async fn create_session(
    State(state): State<ApiState>,
    Json(input): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = input
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("user_id is required".into()))?;

    let session = state
        .sessions
        .create_session(&user_id, input.session_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Session created successfully",
            "session": session,
        })),
    ))
}

pub async fn list_sessions(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.list_sessions(&user_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "user_id": user_id,
            "count": sessions.len(),
            "sessions": sessions,
        })),
    ))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_session(&user_id, &session_id).await?;
    Ok((StatusCode::OK, Json(json!({ "session": session }))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub session_name: Option<String>,
}

pub async fn update_session(
    State(state): State<ApiState>,
    Path((user_id, session_id)): Path<(String, String)>,
    Json(input): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .rename_session(&user_id, &session_id, input.session_name)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Session updated successfully",
            "session": session,
        })),
    ))
}

pub async fn delete_session(
    State(state): State<ApiState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.delete_session(&user_id, &session_id).await?;
    state
        .cache
        .invalidate(&SessionKey::new(user_id, session_id))
        .await;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Session deleted successfully" })),
    ))
}
