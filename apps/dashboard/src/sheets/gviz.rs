//! Parsing for the Google Visualization (gviz) JSON response.
//!
//! The endpoint wraps its JSON in a JavaScript callback:
//! `google.visualization.Query.setResponse({...});`, optionally preceded by a
//! `/*O_o*/` comment. The payload is pulled out by pattern match before parsing.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::sheets::models::{CellValue, Record, Sheet};
use crate::sheets::SheetError;

static WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)google\.visualization\.Query\.setResponse\((.*)\)\s*;?\s*$")
        .expect("gviz wrapper regex is valid")
});

const ID_HEADERS: &[&str] = &["ID", "Id", "id"];

#[derive(Debug, Deserialize)]
struct GvizResponse {
    #[serde(default)]
    status: Option<String>,
    table: Option<GvizTable>,
}

#[derive(Debug, Deserialize)]
struct GvizTable {
    #[serde(default)]
    cols: Vec<GvizColumn>,
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Debug, Deserialize)]
struct GvizColumn {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct GvizRow {
    #[serde(default)]
    c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Deserialize)]
struct GvizCell {
    #[serde(default)]
    v: Value,
    #[serde(default)]
    f: Option<String>,
}

/// Strips the JavaScript wrapper and returns the bare JSON payload.
pub fn unwrap_payload(body: &str) -> Result<&str, SheetError> {
    WRAPPER
        .captures(body.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| SheetError::Malformed("response is not a gviz setResponse payload".into()))
}

/// Parses a raw gviz response body into a [`Sheet`].
///
/// Each data row becomes one record with exactly one field per column;
/// missing or null cells become [`CellValue::Empty`].
pub fn parse_response(body: &str) -> Result<Sheet, SheetError> {
    let payload = unwrap_payload(body)?;
    let response: GvizResponse = serde_json::from_str(payload)
        .map_err(|e| SheetError::Malformed(format!("invalid gviz JSON: {e}")))?;

    if response.status.as_deref() == Some("error") {
        return Err(SheetError::Malformed(
            "gviz reported an error status (is the sheet published?)".into(),
        ));
    }

    let table = response
        .table
        .ok_or_else(|| SheetError::Malformed("gviz payload has no table".into()))?;

    let headers = unique_headers(&table.cols);
    let mut taken = HashSet::new();

    let records = table
        .rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let mut cells = row.c.into_iter();
            let fields: Vec<(String, CellValue)> = headers
                .iter()
                .map(|h| {
                    let value = cells.next().flatten().map(cell_value).unwrap_or(CellValue::Empty);
                    (h.clone(), value)
                })
                .collect();
            let id = record_id(&fields, index, &mut taken);
            Record { id, fields }
        })
        .collect();

    Ok(Sheet { headers, records })
}

/// Column labels, falling back to the column id, de-duplicated with a numeric suffix.
fn unique_headers(cols: &[GvizColumn]) -> Vec<String> {
    let mut seen = HashSet::new();
    cols.iter()
        .enumerate()
        .map(|(i, col)| {
            let base = match (col.label.trim(), col.id.trim()) {
                (label, _) if !label.is_empty() => label.to_string(),
                (_, id) if !id.is_empty() => id.to_string(),
                _ => format!("Column {}", i + 1),
            };
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

fn cell_value(cell: GvizCell) -> CellValue {
    match cell.v {
        Value::Null => CellValue::Empty,
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
        Value::Bool(b) => CellValue::Text(b.to_string()),
        // Date cells arrive as "Date(2024,0,15)"; the formatted value is what a reader expects.
        Value::String(s) if s.starts_with("Date(") => CellValue::Text(cell.f.unwrap_or(s)),
        Value::String(s) => CellValue::Text(s),
        other => CellValue::Text(other.to_string()),
    }
}

/// The row's ID cell if present and not already used, else `row_<index>`.
/// A synthesized id that collides with an earlier ID cell gets a numeric suffix.
fn record_id(fields: &[(String, CellValue)], index: usize, taken: &mut HashSet<String>) -> String {
    let explicit = fields
        .iter()
        .find(|(h, v)| ID_HEADERS.contains(&h.as_str()) && !v.is_empty())
        .map(|(_, v)| v.to_string().trim().to_string())
        .filter(|id| !id.is_empty());

    if let Some(id) = explicit {
        if taken.insert(id.clone()) {
            return id;
        }
        warn!("Duplicate record id '{id}' in row {index}, using a synthesized id");
    }

    let base = format!("row_{index}");
    let mut id = base.clone();
    let mut n = 2;
    while !taken.insert(id.clone()) {
        id = format!("{base}_{n}");
        n += 1;
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(record: &'a Record, header: &str) -> Option<&'a CellValue> {
        record.fields.iter().find(|(h, _)| h == header).map(|(_, v)| v)
    }

    const BODY: &str = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","status":"ok","table":{"cols":[{"id":"A","label":"Title","type":"string"},{"id":"B","label":"Priority","type":"string"},{"id":"C","label":"Score","type":"number"}],"rows":[{"c":[{"v":"Opp1"},{"v":"High"},{"v":8.0,"f":"8"}]},{"c":[{"v":"Opp2"},null,{"v":3.5}]},{"c":[{"v":"Opp3"}]}]}});"#;

    #[test]
    fn test_row_and_column_counts() {
        let sheet = parse_response(BODY).unwrap();
        assert_eq!(sheet.headers, vec!["Title", "Priority", "Score"]);
        assert_eq!(sheet.records.len(), 3);
        assert!(sheet.records.iter().all(|r| r.fields.len() == 3));
    }

    #[test]
    fn test_missing_cells_are_empty() {
        let sheet = parse_response(BODY).unwrap();
        let second = &sheet.records[1];
        assert_eq!(field(second, "Priority"), Some(&CellValue::Empty));
        assert_eq!(field(second, "Priority").unwrap().to_string(), "");
        let third = &sheet.records[2];
        assert_eq!(field(third, "Score"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_synthesized_ids() {
        let sheet = parse_response(BODY).unwrap();
        let ids: Vec<_> = sheet.ids().collect();
        assert_eq!(ids, vec!["row_0", "row_1", "row_2"]);
    }

    #[test]
    fn test_id_column_wins_over_synthesized_id() {
        let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"ID"},{"label":"Title"}],"rows":[{"c":[{"v":"opp-42"},{"v":"A"}]},{"c":[null,{"v":"B"}]}]}});"#;
        let sheet = parse_response(body).unwrap();
        assert_eq!(sheet.records[0].id, "opp-42");
        assert_eq!(sheet.records[1].id, "row_1");
    }

    #[test]
    fn test_duplicate_id_cells_get_distinct_ids() {
        let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"ID"},{"label":"Title"}],"rows":[{"c":[{"v":"x"},{"v":"A"}]},{"c":[{"v":"x"},{"v":"B"}]},{"c":[null,{"v":"C"}]},{"c":[{"v":"row_2"},{"v":"D"}]}]}});"#;
        let sheet = parse_response(body).unwrap();
        let ids: Vec<_> = sheet.ids().collect();
        assert_eq!(ids, vec!["x", "row_1", "row_2", "row_3"]);
        let titles: Vec<_> = ids.iter().map(|id| sheet.find(id).unwrap().title()).collect();
        assert_eq!(titles, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_synthesized_id_avoids_earlier_id_cell() {
        let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"ID"}],"rows":[{"c":[{"v":"row_1"}]},{"c":[null]}]}});"#;
        let sheet = parse_response(body).unwrap();
        let ids: Vec<_> = sheet.ids().collect();
        assert_eq!(ids, vec!["row_1", "row_1_2"]);
    }

    #[test]
    fn test_duplicate_and_blank_labels() {
        let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"id":"A","label":"Notes"},{"id":"B","label":"Notes"},{"id":"C","label":""}],"rows":[]}});"#;
        let sheet = parse_response(body).unwrap();
        assert_eq!(sheet.headers, vec!["Notes", "Notes_2", "C"]);
        assert!(sheet.records.is_empty());
    }

    #[test]
    fn test_date_cells_use_formatted_value() {
        let body = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Date"}],"rows":[{"c":[{"v":"Date(2024,0,15)","f":"1/15/2024"}]}]}});"#;
        let sheet = parse_response(body).unwrap();
        assert_eq!(field(&sheet.records[0], "Date").unwrap().to_string(), "1/15/2024");
    }

    #[test]
    fn test_missing_wrapper_is_malformed() {
        let err = parse_response(r#"{"table":{}}"#).unwrap_err();
        assert!(matches!(err, SheetError::Malformed(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse_response("google.visualization.Query.setResponse({not json});").unwrap_err();
        assert!(matches!(err, SheetError::Malformed(_)));
    }

    #[test]
    fn test_error_status_is_malformed() {
        let body = r#"google.visualization.Query.setResponse({"status":"error","errors":[{"reason":"access_denied"}]});"#;
        assert!(matches!(parse_response(body), Err(SheetError::Malformed(_))));
    }
}
