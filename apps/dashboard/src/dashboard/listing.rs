//! List and detail views over the loaded sheet.

use serde::{Deserialize, Serialize};

use crate::opportunities::{Flags, OpportunityStore};
use crate::sheets::{CellValue, Record, Sheet};

const URL_HEADERS: &[&str] = &["URL", "Link"];
const PRIORITY_HEADERS: &[&str] = &["Priority"];
const TAGS_HEADERS: &[&str] = &["Tags"];
const DATE_HEADERS: &[&str] = &["Date", "Deadline"];
const SCORE_HEADERS: &[&str] = &["Score"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Favorites,
    Rejected,
    Unread,
    Undecided,
}

impl StatusFilter {
    pub fn admits(&self, flags: &Flags) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Favorites => flags.favorited,
            StatusFilter::Rejected => flags.rejected,
            StatusFilter::Unread => flags.unread,
            StatusFilter::Undecided => flags.undecided,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub filter: StatusFilter,
}

/// One row of the list view.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub date: Option<String>,
    pub score: Option<f64>,
    pub flags: Flags,
}

/// The detail view: every field in header order plus the record's flags.
#[derive(Debug, Clone, Serialize)]
pub struct RecordDetail {
    pub summary: RecordSummary,
    pub fields: Vec<FieldView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldView {
    pub header: String,
    pub value: CellValue,
    pub display: String,
}

fn text_of(record: &Record, headers: &[&str]) -> Option<String> {
    record
        .get_any(headers)
        .map(|v| v.to_string().trim().to_string())
}

pub fn summarize(record: &Record, flags: Flags) -> RecordSummary {
    RecordSummary {
        id: record.id.clone(),
        title: record.title(),
        url: text_of(record, URL_HEADERS),
        priority: text_of(record, PRIORITY_HEADERS),
        tags: text_of(record, TAGS_HEADERS)
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        date: text_of(record, DATE_HEADERS),
        score: record.get_any(SCORE_HEADERS).and_then(CellValue::as_number),
        flags,
    }
}

pub fn detail(record: &Record, flags: Flags) -> RecordDetail {
    RecordDetail {
        summary: summarize(record, flags),
        fields: record
            .fields
            .iter()
            .map(|(header, value)| FieldView {
                header: header.clone(),
                value: value.clone(),
                display: value.to_string(),
            })
            .collect(),
    }
}

/// Applies the search text (case-insensitive, any field) and the status filter.
pub fn list(sheet: &Sheet, store: &OpportunityStore, query: &RecordQuery) -> Vec<RecordSummary> {
    let needle = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    sheet
        .records
        .iter()
        .filter(|r| needle.as_deref().map_or(true, |n| r.matches(n)))
        .map(|r| (r, store.flags(&r.id)))
        .filter(|(_, flags)| query.filter.admits(flags))
        .map(|(r, flags)| summarize(r, flags))
        .collect()
}
