use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    companion::StudyCompanion,
    errors::{ErrorContext, StudyError},
    messages::{StudyRequest, StudyResponse},
    models::*,
};

#[derive(Clone)]
pub struct AppState {
    pub companion: Arc<StudyCompanion>,
}

impl AppState {
    pub fn new(companion: StudyCompanion) -> Self {
        Self {
            companion: Arc::new(companion),
        }
    }

    /// Share a companion that other host tasks also hold
    pub fn shared(companion: Arc<StudyCompanion>) -> Self {
        Self { companion }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateModuleRequest {
    pub transcript: Vec<TranscriptSegment>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Deserialize)]
pub struct ScheduleReviewRequest {
    pub when: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct LibraryParams {
    pub tag: Option<String>,
}

#[derive(Deserialize)]
pub struct DueParams {
    pub now: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "provider": state.companion.generator().provider_name(),
    }))
}

/// Single entry point for tagged study requests
pub async fn handle_message(
    State(state): State<AppState>,
    Json(request): Json<StudyRequest>,
) -> Result<Json<ApiResponse<StudyResponse>>, (StatusCode, Json<ApiResponse<()>>)> {
    let action = request.action();
    debug!(action = %action, "Dispatching study request");

    match state.companion.dispatch(request).await {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new(action, "study request"))),
    }
}

// Library endpoints
pub async fn list_library(
    State(state): State<AppState>,
    Query(params): Query<LibraryParams>,
) -> Result<Json<ApiResponse<Vec<LibraryItem>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let library = state.companion.library();
    let result = match params.tag.as_deref() {
        Some(tag) => library.list_by_tag(tag).await,
        None => library.list_all().await,
    };

    match result {
        Ok(items) => {
            info!(count = items.len(), tag = ?params.tag, "Listed library items");
            Ok(Json(ApiResponse::success(items)))
        }
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("list_library", "library item"))),
    }
}

pub async fn upsert_item(
    State(state): State<AppState>,
    Json(update): Json<LibraryItemUpdate>,
) -> Result<Json<ApiResponse<LibraryItem>>, (StatusCode, Json<ApiResponse<()>>)> {
    let item_id = update.item_id.clone();
    match state.companion.library().upsert(update).await {
        Ok(item) => Ok(Json(ApiResponse::success(item))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("upsert_item", "library item").with_id(&item_id),
        )),
    }
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LibraryItem>>, (StatusCode, Json<ApiResponse<()>>)> {
    let context = ErrorContext::new("get_item", "library item").with_id(&id);
    match state.companion.library().get(&id).await {
        Ok(Some(item)) => Ok(Json(ApiResponse::success(item))),
        Ok(None) => Err(StudyError::NotFound(format!("library item '{}'", id))
            .to_response_with_context(context)),
        Err(e) => Err(e.to_response_with_context(context)),
    }
}

/// Removing an item that is not in the library succeeds with `false`
pub async fn remove_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<bool>>, (StatusCode, Json<ApiResponse<()>>)> {
    match state.companion.library().remove(&id).await {
        Ok(removed) => Ok(Json(ApiResponse::success(removed))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("remove_item", "library item").with_id(&id),
        )),
    }
}

pub async fn record_study_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LibraryItem>>, (StatusCode, Json<ApiResponse<()>>)> {
    match state.companion.library().record_study_session(&id).await {
        Ok(item) => Ok(Json(ApiResponse::success(item))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("record_study_session", "library item").with_id(&id),
        )),
    }
}

// Study module endpoint
pub async fn generate_study_module(
    State(state): State<AppState>,
    Json(request): Json<GenerateModuleRequest>,
) -> Result<Json<ApiResponse<StudyModule>>, (StatusCode, Json<ApiResponse<()>>)> {
    info!(
        segment_count = request.transcript.len(),
        difficulty = %request.difficulty,
        "Generating study module"
    );

    match state
        .companion
        .generate_study_module(&request.transcript, &request.highlights, request.difficulty)
        .await
    {
        Ok(module) => Ok(Json(ApiResponse::success(module))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new(
            "generate_study_module",
            "study module",
        ))),
    }
}

// Review endpoints
pub async fn due_reviews(
    State(state): State<AppState>,
    Query(params): Query<DueParams>,
) -> Result<Json<ApiResponse<Vec<DueReview>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let now = params.now.unwrap_or_else(Utc::now);
    match state.companion.scheduler().due_reviews(now).await {
        Ok(due) => Ok(Json(ApiResponse::success(due))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("due_reviews", "review"))),
    }
}

pub async fn schedule_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ScheduleReviewRequest>,
) -> Result<Json<ApiResponse<ReviewSchedule>>, (StatusCode, Json<ApiResponse<()>>)> {
    match state
        .companion
        .scheduler()
        .schedule_review(&id, request.when)
        .await
    {
        Ok(schedule) => Ok(Json(ApiResponse::success(schedule))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("schedule_review", "review").with_id(&id),
        )),
    }
}

pub async fn cancel_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<bool>>, (StatusCode, Json<ApiResponse<()>>)> {
    match state.companion.scheduler().cancel_review(&id).await {
        Ok(cancelled) => Ok(Json(ApiResponse::success(cancelled))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("cancel_review", "review").with_id(&id),
        )),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/messages", post(handle_message))
        // Library routes
        .route("/api/library", get(list_library).post(upsert_item))
        .route("/api/library/:id", get(get_item).delete(remove_item))
        .route("/api/library/:id/study", post(record_study_session))
        // Study module routes
        .route("/api/study-modules", post(generate_study_module))
        // Review routes
        .route("/api/reviews/due", get(due_reviews))
        .route("/api/reviews/:id", put(schedule_review).delete(cancel_review))
        .with_state(state)
}
