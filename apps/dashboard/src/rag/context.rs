use crate::documents::UploadedDocument;
use crate::sheets::Record;

/// Builds the context block handed to the prompt builder.
///
/// Record fields come first in sheet header order (empty values skipped),
/// followed by document texts in upload order. Either section is left out
/// entirely when there is nothing to put in it. The result is never truncated.
pub fn assemble_context(record: Option<&Record>, documents: &[UploadedDocument]) -> String {
    let mut context = String::new();

    if let Some(record) = record {
        context.push_str("RECORD INFORMATION:\n");
        push_fields(&mut context, record);
        context.push('\n');
    }
    push_documents(&mut context, documents);

    context
}

/// Like [`assemble_context`], but for records retrieved from the whole sheet,
/// most relevant first.
pub fn assemble_retrieved_context(records: &[&Record], documents: &[UploadedDocument]) -> String {
    let mut context = String::new();

    if !records.is_empty() {
        context.push_str("RELEVANT RECORDS:\n");
        for (i, record) in records.iter().enumerate() {
            context.push_str(&format!("Record {}:\n", i + 1));
            push_fields(&mut context, record);
            context.push('\n');
        }
    }
    push_documents(&mut context, documents);

    context
}

fn push_fields(context: &mut String, record: &Record) {
    for (header, value) in record.fields.iter().filter(|(_, v)| !v.is_empty()) {
        context.push_str(&format!("{header}: {value}\n"));
    }
}

fn push_documents(context: &mut String, documents: &[UploadedDocument]) {
    if !documents.is_empty() {
        context.push_str("DOCUMENT CONTENT:\n");
        for (i, doc) in documents.iter().enumerate() {
            context.push_str(&format!("Document {}: {}\n\n", i + 1, doc.extracted_text));
        }
    }
}
