//! Sheet-wide retrieval for questions asked with no record selected.
//!
//! Each record and the question become term-frequency vectors over lowercase
//! alphanumeric tokens; records are ranked by cosine similarity to the question.

use std::collections::HashMap;

use crate::sheets::{Record, Sheet};

/// How many records a sheet-wide question gets as context.
pub const TOP_N: usize = 3;

/// Below this best score the sheet is considered to hold nothing relevant.
pub const MIN_SCORE: f32 = 0.3;

/// Shown alongside the answer when retrieval found nothing close enough.
pub const LOW_RELEVANCE_NOTICE: &str =
    "Could not find sufficiently relevant records in the sheet. Asking Gemini directly.";

#[derive(Debug)]
pub struct Retrieval<'a> {
    /// Best first. Records sharing no term with the question are left out.
    pub records: Vec<&'a Record>,
    pub best_score: f32,
}

impl Retrieval<'_> {
    pub fn is_relevant(&self) -> bool {
        self.best_score >= MIN_SCORE
    }
}

/// Ranks every record of `sheet` against `question` and keeps the `top_n` best.
/// Ties keep sheet order.
pub fn retrieve<'a>(sheet: &'a Sheet, question: &str, top_n: usize) -> Retrieval<'a> {
    let query = term_frequencies(question);
    let mut scored: Vec<(&Record, f32)> = sheet
        .records
        .iter()
        .map(|record| (record, cosine_similarity(&query, &term_frequencies(&record_text(record)))))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);

    Retrieval {
        best_score: scored.first().map(|(_, s)| *s).unwrap_or(0.0),
        records: scored.into_iter().map(|(r, _)| r).collect(),
    }
}

fn record_text(record: &Record) -> String {
    record
        .fields
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(_, v)| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    let dot: f32 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
