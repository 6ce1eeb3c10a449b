
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};

/// A stored document. Fragments of a document become searchable only
/// once the document is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source: Option<String>,
    pub language: Option<String>,
    /// JSON object, stored as TEXT
    pub metadata: String,
    pub status: DocumentStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Staged,
    Committed,
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Staged => write!(f, "staged"),
            DocumentStatus::Committed => write!(f, "committed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    /// Explicit id makes re-ingestion idempotent; `None` generates one
    pub id: Option<String>,
    pub title: String,
    pub source: Option<String>,
    pub language: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub ordinal: i64,
    pub token_count: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    /// JSON object, stored as TEXT
    pub metadata: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFragment {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub ordinal: i64,
    pub token_count: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub metadata: Value,
}

/// A committed fragment joined with its document, as returned for
/// search candidates
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FragmentHitRow {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub ordinal: i64,
    pub token_count: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub metadata: String,
    pub document_title: String,
    pub document_created_at: NaiveDateTime,
}

impl Document {
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.status == DocumentStatus::Committed
    }

    /// Parse the stored metadata JSON, falling back to an empty object
    /// for rows written by hand or by older versions
    #[inline]
    pub fn metadata_value(&self) -> Value {
        serde_json::from_str(&self.metadata).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

impl Fragment {
    #[inline]
    pub fn metadata_value(&self) -> Value {
        serde_json::from_str(&self.metadata).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}
