use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use retrieval_pipeline::artifacts::{generate_artifact, ArtifactKind};

use common::storage::store::artifact_key;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

pub async fn generate_notes(
    state: State<ApiState>,
    input: Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (artifact, session_id) = generate(state, input, ArtifactKind::Notes).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Notes generated successfully",
            "notes": artifact.text,
            "filename": artifact.file_name,
            "session_id": session_id,
        })),
    ))
}

pub async fn generate_practice_test(
    state: State<ApiState>,
    input: Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (artifact, session_id) = generate(state, input, ArtifactKind::PracticeTest).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Practice test generated successfully",
            "questions": artifact.text,
            "filename": artifact.file_name,
            "session_id": session_id,
        })),
    ))
}

async fn generate(
    State(state): State<ApiState>,
    Json(input): Json<GenerateRequest>,
    kind: ArtifactKind,
) -> Result<(retrieval_pipeline::artifacts::GeneratedArtifact, String), ApiError> {
    let user_id = input
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("user_id is required".into()))?;
    let session_id = input
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("session_id is required".into()))?;

    let artifact = generate_artifact(
        &state.storage,
        &state.sessions,
        &state.completer,
        kind,
        &user_id,
        &session_id,
        state.config.artifact_context_chars,
        state.config.artifact_max_tokens,
    )
    .await?;

    Ok((artifact, session_id))
}

pub async fn download(
    State(state): State<ApiState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(ApiError::ValidationError("invalid file name".into()));
    }

    let bytes = state
        .storage
        .get_opt(&artifact_key(&file_name))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("File {file_name} not found")))?;

    let mime_type = mime_guess::from_path(&file_name)
        .first_or(mime::APPLICATION_OCTET_STREAM)
        .to_string();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((StatusCode::OK, headers, bytes))
}
