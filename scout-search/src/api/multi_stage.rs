//! Multi-stage search API handlers
//!
//! Thin mapping of orchestrator operations onto `/api/multi-stage/*`.
//! Session progress, vacancies and summaries are returned as-is; control
//! operations return a [`SearchResponse`] acknowledgement.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{MultiStageProgress, SnapshotSummary, Vacancy, VacancyStatus};
use crate::services::{ResumeSearchRequest, SearchResponse, StartSearchRequest};
use crate::AppState;

/// GET /api/multi-stage/vacancies query
#[derive(Debug, Default, Deserialize)]
pub struct VacancyQuery {
    /// collected | filtered | enriched | skipped
    pub status: Option<String>,
}

/// GET /api/multi-stage/sessions response
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SnapshotSummary>,
    pub total: usize,
}

/// GET /api/multi-stage/vacancies response
#[derive(Debug, Serialize)]
pub struct VacancyListResponse {
    pub session_id: String,
    pub vacancies: Vec<Vacancy>,
    pub total: usize,
}

/// POST /api/multi-stage/search
///
/// Validates, registers the session and returns 202 while the pipeline runs.
pub async fn start_search(
    State(state): State<AppState>,
    Json(request): Json<StartSearchRequest>,
) -> ApiResult<(StatusCode, Json<SearchResponse>)> {
    let response = state.orchestrator.start_multi_stage_search(request).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/multi-stage/progress/:session_id
pub async fn get_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<MultiStageProgress>> {
    state
        .orchestrator
        .get_progress(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Search session not found: {}", session_id)))
}

/// POST /api/multi-stage/pause/:session_id
pub async fn pause_search(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SearchResponse>> {
    Ok(Json(state.orchestrator.pause_multi_stage_search(&session_id).await?))
}

/// POST /api/multi-stage/resume/:session_id
///
/// Body is optional: `{"settings": {...}}` replaces the stored settings.
pub async fn resume_search(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<SearchResponse>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ResumeSearchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid resume body: {}", e)))?
    };

    Ok(Json(
        state
            .orchestrator
            .resume_multi_stage_search(&session_id, request)
            .await?,
    ))
}

/// POST /api/multi-stage/stop/:session_id
pub async fn stop_search(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SearchResponse>> {
    Ok(Json(state.orchestrator.stop_multi_stage_search(&session_id).await?))
}

/// GET /api/multi-stage/sessions
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<SessionListResponse>> {
    let sessions = state.orchestrator.get_all_sessions().await?;
    Ok(Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    }))
}

/// DELETE /api/multi-stage/sessions/:session_id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.delete_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/multi-stage/vacancies/:session_id?status=
pub async fn list_vacancies(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<VacancyQuery>,
) -> ApiResult<Json<VacancyListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<VacancyStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let vacancies = state
        .orchestrator
        .get_session_vacancies(&session_id, status)
        .await?;

    Ok(Json(VacancyListResponse {
        session_id,
        total: vacancies.len(),
        vacancies,
    }))
}

/// Build multi-stage search routes
pub fn multi_stage_routes() -> Router<AppState> {
    Router::new()
        .route("/api/multi-stage/search", post(start_search))
        .route("/api/multi-stage/progress/:session_id", get(get_progress))
        .route("/api/multi-stage/pause/:session_id", post(pause_search))
        .route("/api/multi-stage/resume/:session_id", post(resume_search))
        .route("/api/multi-stage/stop/:session_id", post(stop_search))
        .route("/api/multi-stage/sessions", get(list_sessions))
        .route("/api/multi-stage/sessions/:session_id", delete(delete_session))
        .route("/api/multi-stage/vacancies/:session_id", get(list_vacancies))
}
