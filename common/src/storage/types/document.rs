use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document types the ingestion pipeline accepts. Adding a variant here and
/// an extractor for it is all that is needed to support a new format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = file_name.rsplit_once('.')?.1;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Manifest entry for one uploaded document. Owned by its session; entries
/// are appended on upload and only removed with the whole session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub filename: String,
    pub stored_as: String,
    pub kind: DocumentKind,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(filename: String, stored_as: String, kind: DocumentKind) -> Self {
        Self {
            filename,
            stored_as,
            kind,
            uploaded_at: Utc::now(),
        }
    }
}

/// Replaces anything outside `[A-Za-z0-9._-]` so a client-supplied name is
/// safe to embed in a storage key.
pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
