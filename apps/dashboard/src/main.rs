mod config;
mod dashboard;
mod documents;
mod errors;
mod llm_client;
mod markdown;
mod opportunities;
mod rag;
mod routes;
mod sheets;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::llm_client::{AnswerEngine, GeminiClient};
use crate::opportunities::{JsonFileStore, KvStore, MemoryStore, OpportunityStore};
use crate::routes::build_router;
use crate::sheets::SheetClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails only on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Opportunity Dashboard v{}", env!("CARGO_PKG_VERSION"));

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()?;

    // Initialize state store
    let kv = build_kv_store(&config);
    let store = OpportunityStore::load(kv)?;

    // Initialize answer engine
    let llm: Arc<dyn AnswerEngine> = Arc::new(GeminiClient::new(
        http.clone(),
        config.gemini_base_url.clone(),
        config.gemini_model.clone(),
    ));
    info!("Answer engine initialized (model: {})", llm.model());
    info!("Features: {:?}", config.features);

    let dashboard = Dashboard::new(store, config.features, config.gemini_api_key.clone());

    let state = AppState {
        sheets: SheetClient::new(http.clone(), config.sheets_base_url.clone()),
        http,
        llm,
        dashboard: Arc::new(Mutex::new(dashboard)),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `:memory:` keeps state for the life of the process only.
fn build_kv_store(config: &Config) -> Arc<dyn KvStore> {
    let quota = Some(config.storage_quota_bytes);
    if config.state_path == ":memory:" {
        info!("State store: in memory");
        Arc::new(MemoryStore::new(quota))
    } else {
        let store = JsonFileStore::new(&config.state_path, quota);
        info!("State store: {}", store.path().display());
        Arc::new(store)
    }
}
