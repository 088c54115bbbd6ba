use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::error::AppError;
use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Durable key-value byte storage for session records, embedding indexes,
/// uploaded files, and generated artifacts.
///
/// The local backend stages writes and renames them into place, so a
/// concurrent read never observes a half-written object.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    pub async fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind: cfg.storage,
            local_base,
        })
    }

    /// Wraps a caller-supplied backend. Used by tests to inject in-memory or
    /// deliberately slow stores.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
        }
    }

    pub fn backend_kind(&self) -> StorageKind {
        self.backend_kind
    }

    pub fn local_base_path(&self) -> Option<&std::path::Path> {
        self.local_base.as_deref()
    }

    /// Atomically replaces the object at `location`.
    pub async fn put(&self, location: &str, data: Bytes) -> Result<(), AppError> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await?;
        Ok(())
    }

    pub async fn get(&self, location: &str) -> Result<Bytes, AppError> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    /// Like `get`, but absence is an expected state rather than an error.
    pub async fn get_opt(&self, location: &str) -> Result<Option<Bytes>, AppError> {
        match self.get(location).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(AppError::Storage(object_store::Error::NotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, location: &str) -> Result<bool, AppError> {
        let path = ObjPath::from(location);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes one object; succeeds when it was already absent.
    pub async fn delete_if_exists(&self, location: &str) -> Result<(), AppError> {
        let path = ObjPath::from(location);
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every object below `prefix`.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), AppError> {
        let prefix_path = ObjPath::from(prefix);
        let locations = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|m| m.location)
            .boxed();
        self.store
            .delete_stream(locations)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<object_store::ObjectMeta>, AppError> {
        let prefix_path = prefix.map(ObjPath::from);
        Ok(self.store.list(prefix_path.as_ref()).try_collect().await?)
    }
}

async fn create_storage_backend(
    cfg: &AppConfig,
) -> Result<(DynStore, Option<PathBuf>), AppError> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

/// Rejects identifiers that would escape their storage prefix.
pub fn validate_id(kind: &str, id: &str) -> Result<(), AppError> {
    if id.is_empty() {
        return Err(AppError::Validation(format!("{kind} must not be empty")));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(AppError::Validation(format!(
            "{kind} contains unsupported path characters"
        )));
    }
    Ok(())
}

pub fn session_record_key(user_id: &str, session_id: &str) -> String {
    format!("sessions/{user_id}/{session_id}.json")
}

pub fn sessions_prefix(user_id: &str) -> String {
    format!("sessions/{user_id}/")
}

pub fn index_key(user_id: &str, session_id: &str) -> String {
    format!("indexes/{user_id}/{session_id}.json")
}

pub fn upload_key(user_id: &str, session_id: &str, stored_as: &str) -> String {
    format!("uploads/{user_id}/{session_id}/{stored_as}")
}

pub fn uploads_prefix(user_id: &str, session_id: &str) -> String {
    format!("uploads/{user_id}/{session_id}/")
}

pub fn artifact_key(file_name: &str) -> String {
    format!("generated/{file_name}")
}
