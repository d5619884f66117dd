//! Text extraction for uploaded documents.
//!
//! Plain text, CSV and JSON are decoded directly. PDFs are read page by page
//! with lopdf so that one broken page does not lose the whole document; if no
//! page yields text we fall back to pdf-extract over the whole buffer. DOCX is a
//! ZIP archive whose `word/document.xml` carries the text in `<w:t>` runs.

use std::io::{BufReader, Cursor};

use quick_xml::events::Event;
use thiserror::Error;
use tracing::{debug, warn};

use crate::documents::UploadedFile;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const DOC_MIME: &str = "application/msword";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("File is not valid UTF-8 text")]
    Undecodable,

    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// Document kinds the extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Pdf,
    Docx,
    LegacyDoc,
    Other,
}

/// Classifies a file by its declared media type, falling back to the extension
/// when the type is missing or generic.
pub fn detect_kind(name: &str, mime_type: &str) -> DocumentKind {
    let mime = mime_type.trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/pdf" => return DocumentKind::Pdf,
        DOCX_MIME => return DocumentKind::Docx,
        DOC_MIME => return DocumentKind::LegacyDoc,
        "application/json" | "text/csv" => return DocumentKind::Text,
        m if m.starts_with("text/") => return DocumentKind::Text,
        "" | "application/octet-stream" => {}
        _ => return DocumentKind::Other,
    }

    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" | "csv" | "tsv" | "json" | "log" => DocumentKind::Text,
        "pdf" => DocumentKind::Pdf,
        "docx" => DocumentKind::Docx,
        "doc" => DocumentKind::LegacyDoc,
        _ => DocumentKind::Other,
    }
}

/// Produces the plain-text content of an uploaded file.
pub fn extract_text(file: &UploadedFile) -> Result<String, ExtractError> {
    let kind = detect_kind(&file.name, &file.mime_type);
    debug!("Extracting {} as {:?} ({} bytes)", file.name, kind, file.bytes.len());

    match kind {
        DocumentKind::Text => Ok(String::from_utf8_lossy(&file.bytes).into_owned()),
        DocumentKind::Pdf => extract_pdf(&file.bytes),
        DocumentKind::Docx => extract_docx(&file.bytes),
        DocumentKind::LegacyDoc => Err(ExtractError::Unsupported(
            "legacy .doc files are not supported; save the document as .docx".to_string(),
        )),
        DocumentKind::Other => {
            String::from_utf8(file.bytes.to_vec()).map_err(|_| ExtractError::Undecodable)
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractError::Failed(format!("PDF: {e}")))?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => pages.push(join_tokens(&text)),
            Err(e) => warn!("Skipping PDF page {page_number}: {e}"),
        }
    }

    if pages.iter().any(|p| !p.is_empty()) {
        return Ok(pages.join("\n"));
    }

    // pdf-extract can panic on malformed PDFs
    let owned = bytes.to_vec();
    match std::panic::catch_unwind(move || pdf_extract::extract_text_from_mem(&owned)) {
        Ok(Ok(text)) => Ok(text
            .lines()
            .map(join_tokens)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")),
        Ok(Err(e)) => Err(ExtractError::Failed(format!("PDF: {e}"))),
        Err(_) => Err(ExtractError::Failed(
            "PDF extraction panicked (malformed file)".to_string(),
        )),
    }
}

fn join_tokens(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Failed(format!("DOCX zip: {e}")))?;
    let doc = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Failed(format!("DOCX missing document.xml: {e}")))?;

    let mut reader = quick_xml::Reader::from_reader(BufReader::new(doc));
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" if !text.is_empty() && !text.ends_with('\n') => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"t" => in_text = false,
            Ok(Event::Text(ref e)) if in_text => {
                if let Ok(s) = e.unescape() {
                    text.push_str(&s);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Failed(format!("DOCX XML: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(text.trim_end().to_string())
}
