use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::llm_client::AnswerEngine;
use crate::sheets::SheetClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Plain client for the CORS proxy.
    pub http: Client,
    pub sheets: SheetClient,
    /// Pluggable answer engine. Default: GeminiClient.
    pub llm: Arc<dyn AnswerEngine>,
    /// Never held across an outbound request.
    pub dashboard: Arc<Mutex<Dashboard>>,
}
