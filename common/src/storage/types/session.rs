use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentRecord;

/// Bump when the on-disk session shape changes incompatibly. Loads reject
/// newer versions instead of misreading them.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SESSION_SCHEMA_VERSION
}

/// One question/answer exchange in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(question: String, answer: String) -> Self {
        Self {
            question,
            answer,
            timestamp: Utc::now(),
        }
    }
}

/// Durable metadata for one chat session: document manifest, transcript,
/// counters. The embedding index lives in a sibling blob under the same
/// `(user_id, session_id)` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_id: String,
    pub user_id: String,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
    pub documents: Vec<DocumentRecord>,
    // Absent on records written before transcripts existed.
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

impl Session {
    pub fn new(user_id: String, session_name: String) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SESSION_SCHEMA_VERSION,
            session_id: Uuid::new_v4().to_string(),
            user_id,
            session_name,
            created_at: now,
            updated_at: now,
            message_count: 0,
            documents: Vec::new(),
            chat_history: Vec::new(),
        }
    }

    /// Refreshes `updated_at`. Monotonic: never moves the timestamp
    /// backwards, even across clock adjustments.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.user_id, &self.session_id)
    }
}

/// Identity of a session as used by the pipeline cache and lock registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}
