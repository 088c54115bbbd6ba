use std::{collections::HashMap, sync::Arc, sync::Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::storage::types::session::SessionKey;

/// Registry of per-session mutation locks.
///
/// Guarantees at-most-one concurrent ingestion (and transcript write) per
/// `(user_id, session_id)`. Entries are created on demand and intentionally
/// never removed: dropping a lock that another task just cloned would let
/// two writers run unserialized.
#[derive(Default)]
pub struct SessionLocks {
    inner: StdMutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock guarding mutations for `key`, creating it if absent.
    pub fn lock_for(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the registry lock leaves the map intact.
            poisoned.into_inner()
        });
        Arc::clone(map.entry(key.clone()).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
