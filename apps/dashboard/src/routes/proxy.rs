use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::error;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// GET /proxy?url=
/// Relays a GET to `url` and returns the body verbatim. Errors are plain text.
pub async fn proxy_handler(State(state): State<AppState>, Query(q): Query<ProxyQuery>) -> Response {
    let Some(url) = q.url.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "URL parameter is required").into_response();
    };

    match relay(&state.http, &url).await {
        Ok((content_type, body)) => {
            let content_type = content_type.unwrap_or_else(|| "text/plain; charset=utf-8".to_string());
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            error!("Proxy error for {url}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error fetching data: {e}"),
            )
                .into_response()
        }
    }
}

async fn relay(client: &reqwest::Client, url: &str) -> Result<(Option<String>, bytes::Bytes), reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok((content_type, response.bytes().await?))
}
