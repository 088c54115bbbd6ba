use bytes::Bytes;
use tracing::{info, warn};

use crate::{
    error::AppError,
    storage::{
        store::{
            index_key, session_record_key, sessions_prefix, uploads_prefix, validate_id,
            StorageManager,
        },
        types::session::{Session, SESSION_SCHEMA_VERSION},
    },
};

/// CRUD over durable session records.
///
/// One JSON object per session under `sessions/{user_id}/{session_id}.json`;
/// writes go through the storage manager's atomic replace.
#[derive(Clone)]
pub struct SessionStore {
    storage: StorageManager,
}

impl SessionStore {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        session_name: Option<String>,
    ) -> Result<Session, AppError> {
        validate_id("user_id", user_id)?;

        let name = session_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "New Chat".to_string());
        let session = Session::new(user_id.to_owned(), name);
        self.save(&session).await?;

        info!(user_id, session_id = %session.session_id, "Created session");
        Ok(session)
    }

    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Session, AppError> {
        validate_id("user_id", user_id)?;
        validate_id("session_id", session_id)?;

        let key = session_record_key(user_id, session_id);
        let bytes = self
            .storage
            .get_opt(&key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
        decode_session(&bytes)
    }

    /// All sessions for one user, most recently updated first. A record that
    /// fails to decode is skipped so one corrupt file cannot hide the rest.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, AppError> {
        validate_id("user_id", user_id)?;

        let mut sessions = Vec::new();
        for meta in self.storage.list(Some(&sessions_prefix(user_id))).await? {
            let location = meta.location.to_string();
            let bytes = match self.storage.get_opt(&location).await? {
                Some(bytes) => bytes,
                // Deleted between list and get.
                None => continue,
            };
            match decode_session(&bytes) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    warn!(user_id, location, error = %err, "Skipping undecodable session record");
                }
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    pub async fn rename_session(
        &self,
        user_id: &str,
        session_id: &str,
        session_name: Option<String>,
    ) -> Result<Session, AppError> {
        let mut session = self.get_session(user_id, session_id).await?;
        if let Some(name) = session_name.filter(|name| !name.trim().is_empty()) {
            session.session_name = name;
        }
        session.touch();
        self.save(&session).await?;
        Ok(session)
    }

    pub async fn save(&self, session: &Session) -> Result<(), AppError> {
        let key = session_record_key(&session.user_id, &session.session_id);
        let bytes = serde_json::to_vec(session)?;
        self.storage.put(&key, Bytes::from(bytes)).await
    }

    /// Removes the session record, its embedding index, and any uploaded
    /// files. Pieces that are already gone are ignored, so a repeated delete
    /// reports the same success.
    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), AppError> {
        validate_id("user_id", user_id)?;
        validate_id("session_id", session_id)?;

        self.storage
            .delete_if_exists(&session_record_key(user_id, session_id))
            .await?;
        self.storage
            .delete_if_exists(&index_key(user_id, session_id))
            .await?;
        self.storage
            .delete_prefix(&uploads_prefix(user_id, session_id))
            .await?;

        info!(user_id, session_id, "Deleted session");
        Ok(())
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }
}

fn decode_session(bytes: &[u8]) -> Result<Session, AppError> {
    let session: Session = serde_json::from_slice(bytes)
        .map_err(|e| AppError::Decode(format!("invalid session record: {e}")))?;
    if session.schema_version > SESSION_SCHEMA_VERSION {
        return Err(AppError::Decode(format!(
            "session record schema version {} is newer than supported {}",
            session.schema_version, SESSION_SCHEMA_VERSION
        )));
    }
    Ok(session)
}
