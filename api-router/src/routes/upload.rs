use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use uuid::Uuid;

use common::{
    error::AppError,
    storage::{
        store::upload_key,
        types::document::{sanitize_file_name, DocumentKind, DocumentRecord},
    },
};
use ingestion_pipeline::coordinator::{ingest_documents, ExtractedDocument};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub user_id: String,
    pub session_id: String,
    #[form_data(limit = "16000000")]
    #[form_data(default)]
    pub files: Vec<FieldData<NamedTempFile>>,
}

pub async fn upload_documents(
    State(state): State<ApiState>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = input.user_id;
    let session_id = input.session_id;

    if input.files.is_empty() {
        return Err(ApiError::ValidationError("No files provided".into()));
    }

    // Reject unknown sessions before any file lands in storage.
    state.sessions.get_session(&user_id, &session_id).await?;

    info!(
        user_id,
        session_id,
        file_count = input.files.len(),
        "Received upload request"
    );

    let mut documents = Vec::new();
    for file in input.files {
        let Some(file_name) = file.metadata.file_name.clone() else {
            warn!("Skipping upload part without a file name");
            continue;
        };
        let Some(kind) = DocumentKind::from_file_name(&file_name) else {
            warn!(file_name, "Skipping file with unsupported extension");
            continue;
        };

        let bytes = tokio::fs::read(file.contents.path())
            .await
            .map_err(AppError::from)?;

        // Raw bytes are kept alongside the index so the original document
        // survives re-chunking or format migrations.
        let stored_as = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(&file_name));
        state
            .storage
            .put(
                &upload_key(&user_id, &session_id, &stored_as),
                Bytes::from(bytes.clone()),
            )
            .await?;

        let extractors = std::sync::Arc::clone(&state.extractors);
        let text = tokio::task::spawn_blocking(move || extractors.extract(kind, &bytes))
            .await
            .map_err(AppError::from)?;

        documents.push(ExtractedDocument {
            record: DocumentRecord::new(file_name, stored_as, kind),
            text,
        });
    }

    let outcome = ingest_documents(
        &state.storage,
        &state.sessions,
        &state.cache,
        &state.locks,
        &state.embedder,
        state.chunker_settings(),
        &user_id,
        &session_id,
        documents,
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Documents uploaded successfully",
            "files": outcome.records,
            "chunks_indexed": outcome.chunks_added,
            "session_id": session_id,
        })),
    ))
}
