use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::UploadedDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a record's chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    /// Markdown as typed or as returned by the model.
    pub content: String,
    /// Rendered HTML, assistant messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            html: None,
            sent_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, html: String) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            html: Some(html),
            sent_at: Utc::now(),
        }
    }
}

/// Free-form per-record state, keyed by record id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityState {
    pub read: bool,
    pub undecided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<UploadedDocument>>,
}

/// Set membership of one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub favorited: bool,
    pub rejected: bool,
    pub unread: bool,
    pub undecided: bool,
}

/// Membership totals across all records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub favorited: usize,
    pub rejected: usize,
    pub unread: usize,
    pub undecided: usize,
}
