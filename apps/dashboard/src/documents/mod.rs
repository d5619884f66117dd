//! Uploaded documents for the RAG session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod extract;

pub use extract::extract_text;

/// A raw upload as received from the client.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// A document whose text has been extracted, owned by the current record session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub extracted_text: String,
}

/// Document metadata without the extracted text, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub text_chars: usize,
}

impl From<&UploadedDocument> for DocumentSummary {
    fn from(doc: &UploadedDocument) -> Self {
        Self {
            name: doc.name.clone(),
            mime_type: doc.mime_type.clone(),
            size_bytes: doc.size_bytes,
            text_chars: doc.extracted_text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a multi-file upload. Failures never abort the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<UploadedDocument>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.documents.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Extracts every file independently and aggregates the results.
pub fn extract_batch(files: &[UploadedFile]) -> BatchReport {
    let mut report = BatchReport::default();
    for file in files {
        match extract_text(file) {
            Ok(text) => report.documents.push(UploadedDocument {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                size_bytes: file.bytes.len() as u64,
                extracted_text: text,
            }),
            Err(e) => {
                warn!("Failed to extract {}: {e}", file.name);
                report.failures.push(FileFailure {
                    name: file.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        "Document batch processed: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    report
}

/// Adds documents to a session list. A name already present is replaced in place,
/// so names stay unique and upload order is preserved.
pub fn merge_documents(session: &mut Vec<UploadedDocument>, incoming: Vec<UploadedDocument>) {
    for doc in incoming {
        match session.iter_mut().find(|d| d.name == doc.name) {
            Some(existing) => *existing = doc,
            None => session.push(doc),
        }
    }
}
