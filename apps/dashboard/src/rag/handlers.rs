use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dashboard::{ChatTurn, SessionView, UploadOutcome};
use crate::documents::{extract_batch, UploadedFile};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Serialize)]
pub struct ClearDocumentsResponse {
    pub cleared: bool,
    pub storage_warning: Option<String>,
}

/// GET /api/v1/session
pub async fn handle_get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.dashboard.lock().await.session_view())
}

/// POST /api/v1/session/documents
///
/// Multipart upload; every part with a file name is one document. Extraction
/// runs on the blocking pool and one bad file never fails the others. If the
/// selection changes meanwhile, the documents are discarded.
pub async fn handle_upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, AppError> {
    let ticket = state.dashboard.lock().await.begin_upload()?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read '{name}': {e}")))?;
        debug!("Received {name} ({mime_type}, {} bytes)", bytes.len());
        files.push(UploadedFile {
            name,
            mime_type,
            bytes,
        });
    }
    if files.is_empty() {
        return Err(AppError::Validation("No files in upload".to_string()));
    }

    let report = tokio::task::spawn_blocking(move || extract_batch(&files))
        .await
        .map_err(|e| anyhow::anyhow!("document extraction task failed: {e}"))?;

    let outcome = state.dashboard.lock().await.add_documents(ticket, report)?;
    info!(
        "Upload complete: {} succeeded, {} failed",
        outcome.succeeded, outcome.failed
    );
    Ok(Json(outcome))
}

/// DELETE /api/v1/session/documents
pub async fn handle_clear_documents(State(state): State<AppState>) -> Json<ClearDocumentsResponse> {
    let storage_warning = state.dashboard.lock().await.clear_documents();
    Json(ClearDocumentsResponse {
        cleared: true,
        storage_warning,
    })
}

/// POST /api/v1/session/ask
///
/// The controller lock is released while the model is generating. If the user
/// switches records or asks again meanwhile, this answer is discarded.
pub async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ChatTurn>, AppError> {
    let pending = state.dashboard.lock().await.begin_question(&req.question)?;
    info!(
        "Asking {} ({} char prompt)",
        state.llm.model(),
        pending.prompt.len()
    );

    let answer = state
        .llm
        .generate(Some(pending.api_key.as_str()), &pending.prompt)
        .await?;

    let mut turn = state
        .dashboard
        .lock()
        .await
        .finish_question(pending.ticket, pending.question, answer)?;
    turn.notice = pending.notice;
    Ok(Json(turn))
}
