//! Retrieval-augmented chat over the selected record, or the best matching
//! records of the sheet, and the uploaded documents.

pub mod context;
pub mod handlers;
pub mod prompts;
pub mod retrieval;
