use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::dashboard::listing::{RecordDetail, RecordQuery, RecordSummary};
use crate::dashboard::{LoadSummary, SessionView};
use crate::errors::AppError;
use crate::opportunities::{Counts, Flags};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoadSheetRequest {
    /// Falls back to `SHEET_ID` when omitted.
    pub sheet_id: Option<String>,
    /// Falls back to `SHEET_NAME` when omitted.
    pub sheet_name: Option<String>,
}

#[derive(Serialize)]
pub struct FlagsResponse {
    pub id: String,
    pub flags: Flags,
    pub counts: Counts,
}

#[derive(Serialize)]
pub struct StateResponse {
    pub counts: Counts,
    pub sheet_loaded: bool,
    pub api_key_set: bool,
    pub chat_enabled: bool,
    pub documents_enabled: bool,
    pub session_persistence: bool,
}

#[derive(Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

/// POST /api/v1/sheet/load
pub async fn handle_load_sheet(
    State(state): State<AppState>,
    body: Option<Json<LoadSheetRequest>>,
) -> Result<Json<LoadSummary>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let sheet_id = req
        .sheet_id
        .or_else(|| state.config.sheet_id.clone())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("sheet_id is required".to_string()))?;
    let sheet_name = req
        .sheet_name
        .unwrap_or_else(|| state.config.sheet_name.clone());

    let ticket = state.dashboard.lock().await.begin_load();
    let sheet = state.sheets.fetch(&sheet_id, &sheet_name).await?;
    let summary = state.dashboard.lock().await.finish_load(ticket, sheet)?;
    Ok(Json(summary))
}

/// GET /api/v1/records
pub async fn handle_list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<RecordSummary>> {
    Json(state.dashboard.lock().await.list(&query))
}

/// GET /api/v1/records/:id
pub async fn handle_get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecordDetail>, AppError> {
    Ok(Json(state.dashboard.lock().await.detail(&id)?))
}

/// POST /api/v1/records/:id/select
pub async fn handle_select(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.dashboard.lock().await.select(&id)?))
}

/// POST /api/v1/records/:id/favorite
pub async fn handle_toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlagsResponse>, AppError> {
    let mut dashboard = state.dashboard.lock().await;
    let flags = dashboard.toggle_favorite(&id)?;
    Ok(Json(FlagsResponse {
        id,
        flags,
        counts: dashboard.counts(),
    }))
}

/// POST /api/v1/records/:id/reject
pub async fn handle_toggle_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlagsResponse>, AppError> {
    let mut dashboard = state.dashboard.lock().await;
    let flags = dashboard.toggle_reject(&id)?;
    Ok(Json(FlagsResponse {
        id,
        flags,
        counts: dashboard.counts(),
    }))
}

/// GET /api/v1/state
pub async fn handle_state(State(state): State<AppState>) -> Json<StateResponse> {
    let dashboard = state.dashboard.lock().await;
    let features = dashboard.features();
    Json(StateResponse {
        counts: dashboard.counts(),
        sheet_loaded: dashboard.sheet().is_some(),
        api_key_set: dashboard.has_api_key(),
        chat_enabled: features.chat,
        documents_enabled: features.documents,
        session_persistence: features.session_persistence,
    })
}

/// PUT /api/v1/settings/api-key
pub async fn handle_set_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<StatusCode, AppError> {
    if req.api_key.trim().is_empty() {
        return Err(AppError::Validation("api_key cannot be empty".to_string()));
    }
    state.dashboard.lock().await.set_api_key(Some(req.api_key));
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/settings/api-key
pub async fn handle_clear_api_key(State(state): State<AppState>) -> StatusCode {
    state.dashboard.lock().await.set_api_key(None);
    StatusCode::NO_CONTENT
}
