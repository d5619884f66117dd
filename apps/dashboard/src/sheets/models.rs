use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell as delivered by the gviz endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Empty => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Whole numbers come back from gviz as floats ("5.0"); show them as integers.
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

/// One sheet row. Fields keep the sheet's header order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub fields: Vec<(String, CellValue)>,
}

impl Record {
    /// Case-insensitive lookup over several candidate header names, first non-empty wins.
    pub fn get_any(&self, candidates: &[&str]) -> Option<&CellValue> {
        candidates.iter().find_map(|c| {
            self.fields
                .iter()
                .find(|(h, v)| h.eq_ignore_ascii_case(c) && !v.is_empty())
                .map(|(_, v)| v)
        })
    }

    /// The value under the first `Title` header, even when empty. Only a sheet
    /// without that header falls back to the first column.
    pub fn title(&self) -> String {
        self.fields
            .iter()
            .find(|(h, _)| h.eq_ignore_ascii_case("Title"))
            .or_else(|| self.fields.first())
            .map(|(_, v)| v.to_string())
            .unwrap_or_default()
    }

    /// True if any field value contains `needle` (already lower-cased).
    pub fn matches(&self, needle: &str) -> bool {
        self.fields
            .iter()
            .any(|(_, v)| v.to_string().to_lowercase().contains(needle))
    }
}

/// A fully parsed sheet. A re-fetch replaces the whole value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl Sheet {
    pub fn find(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }
}
