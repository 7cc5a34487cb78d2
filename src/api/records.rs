use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentReviewer;
use crate::api::pagination::PageQuery;
use crate::core::state::AppState;
use crate::core::time::{format_date, parse_date, primitive_now_utc};
use crate::db::models::{PatientRecord, TimelineEntry, User};
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::record::{
    DocumentDownloadResponse, RecordListQuery, RecordResponse, RecordSummary, ReviewRequest,
    ReviewResponse, TagsRequest, TimelineEntryCreate, TimelineEntryResponse,
};
use crate::services::timeline::{self, entry_key, sorted_entries};

const DOWNLOAD_URL_TTL_SECONDS: u64 = 15 * 60;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records))
        .route("/:record_id", get(get_record))
        .route("/:record_id/timeline", post(add_timeline_entry))
        .route("/:record_id/timeline/:entry_key/review", put(put_review))
        .route("/:record_id/timeline/:entry_key/tags", put(put_tags))
        .route("/:record_id/documents/:document_id/download", get(download_document))
}

/// Newest first. Doctors only see records assigned to them.
async fn list_records(
    Query(params): Query<RecordListQuery>,
    CurrentReviewer(user): CurrentReviewer,
    State(state): State<AppState>,
) -> Result<Json<Vec<RecordSummary>>, ApiError> {
    let page = PageQuery { skip: params.skip, limit: params.limit }.normalized();
    let doctor_filter = if user.role == UserRole::Admin {
        params.doctor_id.as_deref()
    } else {
        Some(user.id.as_str())
    };

    let records = repositories::records::list(state.db(), doctor_filter, page.skip, page.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list patient records"))?;

    Ok(Json(records.into_iter().map(RecordSummary::from_db).collect()))
}

async fn get_record(
    Path(record_id): Path<i64>,
    CurrentReviewer(user): CurrentReviewer,
    State(state): State<AppState>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = fetch_visible_record(&state, record_id, &user).await?;

    let entries = load_entries(&state, record_id).await?;
    let reviews = repositories::records::list_reviews(state.db(), record_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load timeline reviews"))?;
    let documents = repositories::records::list_documents(state.db(), record_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load record documents"))?;

    Ok(Json(RecordResponse::assemble(record, &entries, reviews, documents)))
}

async fn add_timeline_entry(
    Path(record_id): Path<i64>,
    CurrentReviewer(user): CurrentReviewer,
    State(state): State<AppState>,
    Json(payload): Json<TimelineEntryCreate>,
) -> Result<(StatusCode, Json<TimelineEntryResponse>), ApiError> {
    fetch_visible_record(&state, record_id, &user).await?;

    let entry_date = parse_date(&payload.date)
        .ok_or_else(|| ApiError::BadRequest("date must be YYYY-MM-DD".to_string()))?;
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(ApiError::BadRequest("description must not be empty".to_string()));
    }

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let entry = repositories::records::insert_entry(
        &mut *tx,
        repositories::records::CreateEntry {
            record_id,
            entry_date,
            description,
            notes: payload.notes.trim(),
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to add timeline entry"))?;
    repositories::records::touch(&mut *tx, record_id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update patient record"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit timeline entry"))?;

    // Key is reported from the sorted position the entry landed in.
    let entries = load_entries(&state, record_id).await?;
    let position = sorted_entries(&entries)
        .iter()
        .position(|candidate| candidate.id == entry.id)
        .unwrap_or(entries.len().saturating_sub(1));

    tracing::info!(record_id, entry_id = entry.id, user_id = %user.id, "Timeline entry added");
    Ok((
        StatusCode::CREATED,
        Json(TimelineEntryResponse {
            key: entry_key(&entry, position),
            id: entry.id,
            date: format_date(entry.entry_date),
            description: entry.description,
            notes: entry.notes,
            review: None,
            tags: Vec::new(),
        }),
    ))
}

async fn put_review(
    Path((record_id, raw_key)): Path<(i64, String)>,
    CurrentReviewer(user): CurrentReviewer,
    State(state): State<AppState>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    fetch_visible_record(&state, record_id, &user).await?;
    let review = timeline::normalize_review(&payload.review)?;
    let key = resolve_key(&state, record_id, &raw_key).await?;

    let saved = repositories::records::upsert_review_text(
        state.db(),
        record_id,
        &key,
        &review,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save review"))?;

    tracing::info!(record_id, entry_key = %key, user_id = %user.id, "Timeline review saved");
    Ok(Json(ReviewResponse::from_db(saved)))
}

async fn put_tags(
    Path((record_id, raw_key)): Path<(i64, String)>,
    CurrentReviewer(user): CurrentReviewer,
    State(state): State<AppState>,
    Json(payload): Json<TagsRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    fetch_visible_record(&state, record_id, &user).await?;
    let tags = timeline::normalize_tags(&payload.tags)?;
    let key = resolve_key(&state, record_id, &raw_key).await?;

    let saved = repositories::records::upsert_review_tags(
        state.db(),
        record_id,
        &key,
        &tags,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save tags"))?;

    tracing::info!(record_id, entry_key = %key, tags = ?tags, "Timeline tags saved");
    Ok(Json(ReviewResponse::from_db(saved)))
}

async fn download_document(
    Path((record_id, document_id)): Path<(i64, String)>,
    CurrentReviewer(user): CurrentReviewer,
    State(state): State<AppState>,
) -> Result<Json<DocumentDownloadResponse>, ApiError> {
    fetch_visible_record(&state, record_id, &user).await?;

    let document = repositories::records::find_document(state.db(), record_id, &document_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch document"))?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;
    let key = document
        .storage_key
        .ok_or_else(|| ApiError::NotFound("Document content was not stored".to_string()))?;
    let storage = state.storage().ok_or_else(|| {
        ApiError::ServiceUnavailable("Document storage is not configured".to_string())
    })?;

    let url = storage
        .presign_get(&key, Duration::from_secs(DOWNLOAD_URL_TTL_SECONDS))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to generate download URL"))?;

    Ok(Json(DocumentDownloadResponse { url, expires_in: DOWNLOAD_URL_TTL_SECONDS }))
}

async fn fetch_visible_record(
    state: &AppState,
    record_id: i64,
    user: &User,
) -> Result<PatientRecord, ApiError> {
    let record = repositories::records::find_by_id(state.db(), record_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch patient record"))?
        .ok_or_else(|| ApiError::NotFound("Patient record not found".to_string()))?;

    if user.role != UserRole::Admin && record.doctor_id != user.id {
        return Err(ApiError::Forbidden("Record is assigned to another doctor"));
    }
    Ok(record)
}

async fn load_entries(state: &AppState, record_id: i64) -> Result<Vec<TimelineEntry>, ApiError> {
    repositories::records::list_entries(state.db(), record_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load timeline"))
}

/// Canonical key of the entry `raw` points at, in the current sorted view.
async fn resolve_key(state: &AppState, record_id: i64, raw: &str) -> Result<String, ApiError> {
    let entries = load_entries(state, record_id).await?;
    let sorted = sorted_entries(&entries);
    let (_, key) = timeline::resolve_entry_key(&sorted, raw)?;
    Ok(key)
}
