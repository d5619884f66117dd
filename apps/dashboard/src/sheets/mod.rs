//! Sheet data source. Fetches a published Google Sheet through the gviz endpoint.

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};

pub mod gviz;
pub mod models;

pub use models::{CellValue, Record, Sheet};

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheet request failed (status {status}). Check that the sheet is published and the ID is correct")]
    Status { status: u16 },

    #[error("Malformed sheet response: {0}")]
    Malformed(String),
}

/// Read-only client for the gviz JSON export.
#[derive(Clone)]
pub struct SheetClient {
    client: Client,
    base_url: String,
}

impl SheetClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the gviz URL. A purely numeric sheet name is treated as a GID.
    pub fn sheet_url(&self, sheet_id: &str, sheet_name: &str) -> String {
        let selector = if !sheet_name.is_empty() && sheet_name.chars().all(|c| c.is_ascii_digit()) {
            format!("gid={sheet_name}")
        } else {
            format!("sheet={}", urlencoding::encode(sheet_name))
        };
        format!(
            "{}/{}/gviz/tq?tqx=out:json&{selector}",
            self.base_url,
            urlencoding::encode(sheet_id)
        )
    }

    /// Fetches and parses the sheet. Non-2xx responses and transport failures
    /// are network errors; an unparsable body is [`SheetError::Malformed`].
    pub async fn fetch(&self, sheet_id: &str, sheet_name: &str) -> Result<Sheet, SheetError> {
        let url = self.sheet_url(sheet_id, sheet_name);
        debug!("Fetching sheet from {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SheetError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let sheet = gviz::parse_response(&body)?;
        info!(
            "Loaded sheet {sheet_id}: {} records, {} columns",
            sheet.records.len(),
            sheet.headers.len()
        );
        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server as spawn;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    #[test]
    fn test_sheet_url_by_name() {
        let client = SheetClient::new(Client::new(), DEFAULT_SHEETS_BASE_URL);
        assert_eq!(
            client.sheet_url("abc123", "cleaned"),
            "https://docs.google.com/spreadsheets/d/abc123/gviz/tq?tqx=out:json&sheet=cleaned"
        );
    }

    #[test]
    fn test_sheet_url_by_gid_and_encoding() {
        let client = SheetClient::new(Client::new(), "http://localhost/d/");
        assert_eq!(
            client.sheet_url("abc", "0"),
            "http://localhost/d/abc/gviz/tq?tqx=out:json&gid=0"
        );
        assert_eq!(
            client.sheet_url("abc", "My Sheet"),
            "http://localhost/d/abc/gviz/tq?tqx=out:json&sheet=My%20Sheet"
        );
        assert_eq!(
            client.sheet_url("a/b", "Q&A #2"),
            "http://localhost/d/a%2Fb/gviz/tq?tqx=out:json&sheet=Q%26A%20%232"
        );
        assert_eq!(
            client.sheet_url("abc", "2024 Grants"),
            "http://localhost/d/abc/gviz/tq?tqx=out:json&sheet=2024%20Grants"
        );
    }

    #[tokio::test]
    async fn test_fetch_sends_reserved_characters_intact() {
        let router = Router::new().route(
            "/d/:id/gviz/tq",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("sheet").map(String::as_str), Some("Q&A #2"));
                assert_eq!(q.get("tqx").map(String::as_str), Some("out:json"));
                r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Title"}],"rows":[]}});"#
            }),
        );
        let base = spawn(router).await;
        let client = SheetClient::new(Client::new(), format!("{base}/d"));
        let sheet = client.fetch("abc", "Q&A #2").await.unwrap();
        assert!(sheet.records.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_parses_payload() {
        let router = Router::new().route(
            "/d/:id/gviz/tq",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("sheet").map(String::as_str), Some("cleaned"));
                r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Title"}],"rows":[{"c":[{"v":"Opp1"}]}]}});"#
            }),
        );
        let base = spawn(router).await;
        let client = SheetClient::new(Client::new(), format!("{base}/d"));
        let sheet = client.fetch("abc", "cleaned").await.unwrap();
        assert_eq!(sheet.records.len(), 1);
        assert_eq!(sheet.records[0].title(), "Opp1");
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_status_error() {
        let router = Router::new().route(
            "/d/:id/gviz/tq",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
        let base = spawn(router).await;
        let client = SheetClient::new(Client::new(), format!("{base}/d"));
        let err = client.fetch("abc", "cleaned").await.unwrap_err();
        assert!(matches!(err, SheetError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn test_fetch_html_body_is_malformed() {
        let router = Router::new().route("/d/:id/gviz/tq", get(|| async { "<html>sign in</html>" }));
        let base = spawn(router).await;
        let client = SheetClient::new(Client::new(), format!("{base}/d"));
        let err = client.fetch("abc", "cleaned").await.unwrap_err();
        assert!(matches!(err, SheetError::Malformed(_)));
    }
}
