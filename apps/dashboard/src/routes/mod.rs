pub mod health;
pub mod proxy;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::services::ServeDir;

use crate::dashboard::handlers as dashboard;
use crate::rag::handlers as rag;
use crate::state::AppState;

/// Uploads carry whole PDFs; the axum default of 2 MiB is too small.
const UPLOAD_LIMIT_BYTES: usize = 50 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/proxy", get(proxy::proxy_handler))
        // Sheet and records
        .route("/api/v1/sheet/load", post(dashboard::handle_load_sheet))
        .route("/api/v1/records", get(dashboard::handle_list_records))
        .route("/api/v1/records/:id", get(dashboard::handle_get_record))
        .route("/api/v1/records/:id/select", post(dashboard::handle_select))
        .route(
            "/api/v1/records/:id/favorite",
            post(dashboard::handle_toggle_favorite),
        )
        .route(
            "/api/v1/records/:id/reject",
            post(dashboard::handle_toggle_reject),
        )
        .route("/api/v1/state", get(dashboard::handle_state))
        .route(
            "/api/v1/settings/api-key",
            put(dashboard::handle_set_api_key).delete(dashboard::handle_clear_api_key),
        )
        // RAG session
        .route("/api/v1/session", get(rag::handle_get_session))
        .route(
            "/api/v1/session/documents",
            post(rag::handle_upload_documents)
                .delete(rag::handle_clear_documents)
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/api/v1/session/ask", post(rag::handle_ask))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        routing::get as get_route,
    };
    use parking_lot::Mutex as SyncMutex;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use crate::config::{Config, Features};
    use crate::dashboard::Dashboard;
    use crate::llm_client::{AnswerEngine, LlmError};
    use crate::opportunities::{MemoryStore, OpportunityStore};
    use crate::sheets::SheetClient;
    use crate::test_support::spawn_server;

    const GVIZ_BODY: &str = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","status":"ok","table":{"cols":[{"id":"A","label":"Title","type":"string"},{"id":"B","label":"Priority","type":"string"}],"rows":[{"c":[{"v":"Opp1"},{"v":"High"}]},{"c":[{"v":"Opp2"},null]}]}});"#;

    /// Records every prompt and answers with a fixed markdown reply.
    #[derive(Default)]
    struct FakeEngine {
        prompts: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl AnswerEngine for FakeEngine {
        async fn generate(&self, api_key: Option<&str>, prompt: &str) -> Result<String, LlmError> {
            api_key.ok_or(LlmError::MissingApiKey)?;
            self.prompts.lock().push(prompt.to_string());
            Ok("The deadline is **May 1**.".to_string())
        }

        fn model(&self) -> &str {
            "fake"
        }
    }

    async fn sheet_server() -> String {
        let router = axum::Router::new().route(
            "/d/:id/gviz/tq",
            get_route(|| async { GVIZ_BODY }),
        );
        format!("{}/d", spawn_server(router).await)
    }

    fn app(sheets_base: String, features: Features, engine: Arc<FakeEngine>) -> Router {
        let config = Config {
            sheet_id: Some("sheet123".into()),
            features,
            ..Config::default()
        };
        let store = OpportunityStore::load(Arc::new(MemoryStore::new(None))).unwrap();
        let dashboard = Dashboard::new(store, features, Some("test-key".into()));
        let http = reqwest::Client::new();
        build_router(AppState {
            sheets: SheetClient::new(http.clone(), sheets_base),
            http,
            llm: engine,
            dashboard: Arc::new(Mutex::new(dashboard)),
            config,
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn multipart(files: &[(&str, &str, &str)]) -> (String, String) {
        let boundary = "XBOUNDARYX".to_string();
        let mut body = String::new();
        for (name, mime, content) in files {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        (boundary, body)
    }

    async fn upload(app: &Router, files: &[(&str, &str, &str)]) -> (StatusCode, Value) {
        let (boundary, body) = multipart(files);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/session/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(String::new(), Features::default(), Arc::default());
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_load_select_favorite_flow() {
        let app = app(sheet_server().await, Features::default(), Arc::default());

        let (status, body) = send(&app, Method::POST, "/api/v1/sheet/load", None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["records"], 2);

        let (_, records) = send(&app, Method::GET, "/api/v1/records?filter=unread", None).await;
        assert_eq!(records.as_array().unwrap().len(), 2);
        assert_eq!(records[0]["id"], "row_0");
        assert_eq!(records[0]["title"], "Opp1");

        let (status, session) = send(&app, Method::POST, "/api/v1/records/row_0/select", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["selected"]["summary"]["flags"]["undecided"], true);

        let (_, state) = send(&app, Method::GET, "/api/v1/state", None).await;
        assert_eq!(state["counts"], json!({"favorited": 0, "rejected": 0, "unread": 1, "undecided": 1}));

        let (_, toggled) = send(&app, Method::POST, "/api/v1/records/row_0/favorite", None).await;
        assert_eq!(toggled["flags"]["favorited"], true);
        assert_eq!(toggled["flags"]["undecided"], false);

        let (_, toggled) = send(&app, Method::POST, "/api/v1/records/row_0/favorite", None).await;
        assert_eq!(toggled["flags"]["favorited"], false);
        assert_eq!(toggled["flags"]["undecided"], true);

        let (status, body) = send(&app, Method::POST, "/api/v1/records/nope/reject", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_upload_and_ask() {
        let engine = Arc::new(FakeEngine::default());
        let app = app(sheet_server().await, Features::default(), engine.clone());
        send(&app, Method::POST, "/api/v1/sheet/load", None).await;
        send(&app, Method::POST, "/api/v1/records/row_0/select", None).await;

        let (status, outcome) = upload(
            &app,
            &[
                ("notes.txt", "text/plain", "Deadline is May 1"),
                ("old.doc", "application/msword", "binary"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{outcome}");
        assert_eq!(outcome["succeeded"], 1);
        assert_eq!(outcome["failed"], 1);
        assert_eq!(outcome["failures"][0]["name"], "old.doc");

        let (status, turn) = send(
            &app,
            Method::POST,
            "/api/v1/session/ask",
            Some(json!({"question": "When is the deadline?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{turn}");
        assert_eq!(turn["answer"]["html"], "<p>The deadline is <strong>May 1</strong>.</p>");

        let prompt = engine.prompts.lock()[0].clone();
        assert!(prompt.contains("RECORD INFORMATION:\nTitle: Opp1\nPriority: High\n\n"));
        assert!(prompt.contains("Document 1: Deadline is May 1"));

        let (_, session) = send(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(session["transcript"].as_array().unwrap().len(), 2);

        let (_, cleared) = send(&app, Method::DELETE, "/api/v1/session/documents", None).await;
        assert_eq!(cleared["cleared"], true);
        let (_, session) = send(&app, Method::GET, "/api/v1/session", None).await;
        assert!(session["documents"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ask_without_key_makes_no_call() {
        let engine = Arc::new(FakeEngine::default());
        let app = app(String::new(), Features::default(), engine.clone());
        let (status, _) = send(&app, Method::DELETE, "/api/v1/settings/api-key", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/session/ask",
            Some(json!({"question": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_API_KEY");
        assert!(engine.prompts.lock().is_empty());

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/v1/settings/api-key",
            Some(json!({"api_key": "k2"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, state) = send(&app, Method::GET, "/api/v1/state", None).await;
        assert_eq!(state["api_key_set"], true);
    }

    #[tokio::test]
    async fn test_disabled_features_are_forbidden() {
        let features = Features {
            chat: false,
            documents: false,
            session_persistence: false,
        };
        let app = app(String::new(), features, Arc::default());
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/session/ask",
            Some(json!({"question": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FEATURE_DISABLED");

        let (status, _) = upload(&app, &[("a.txt", "text/plain", "x")]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_sheet_is_reported() {
        let router = axum::Router::new().route("/d/:id/gviz/tq", get_route(|| async { "<html>login</html>" }));
        let base = format!("{}/d", spawn_server(router).await);
        let app = app(base, Features::default(), Arc::default());
        let (status, body) = send(&app, Method::POST, "/api/v1/sheet/load", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "MALFORMED_SHEET");
    }

    #[tokio::test]
    async fn test_proxy_relays_body_and_rejects_missing_url() {
        let upstream = spawn_server(axum::Router::new().route("/data", get_route(|| async { "payload" }))).await;
        let app = app(String::new(), Features::default(), Arc::default());

        let request = Request::builder()
            .uri(format!("/proxy?url={}", urlencoding::encode(&format!("{upstream}/data"))))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"payload");

        let request = Request::builder().uri("/proxy").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"URL parameter is required");

        let request = Request::builder()
            .uri(format!("/proxy?url={}", urlencoding::encode(&format!("{upstream}/missing"))))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("Error fetching data:"));
    }
}
