use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::api::validation::validate_document_upload;
use crate::core::config::Settings;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, today_utc};
use crate::db::models::User;
use crate::repositories;
use crate::schemas::record::RecordResponse;
use crate::schemas::upload::{WizardPatch, WizardStart, WizardView};
use crate::services::storage::record_document_key;
use crate::services::upload_wizard::{RecordDraft, StagedFile};

pub(crate) fn router(settings: &Settings) -> Router<AppState> {
    Router::new()
        .route(
            "/wizard",
            post(start_wizard).get(get_wizard).patch(update_wizard).delete(cancel_wizard),
        )
        .route("/wizard/files", post(add_files))
        .route("/wizard/files/:index", delete(remove_file))
        .route("/wizard/submit", post(submit_wizard))
        .route("/previews/:token", get(preview))
        .layer(DefaultBodyLimit::max(settings.storage().max_request_bytes()))
}

/// Starts a wizard for the caller. An existing wizard is dropped first,
/// which revokes its preview URLs.
async fn start_wizard(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<WizardStart>,
) -> Result<(StatusCode, Json<WizardView>), ApiError> {
    let max_files = state.settings().storage().max_files_per_upload as usize;
    let mut wizard = state.uploads().new_wizard(&admin.id, max_files);
    wizard.select_document_type(payload.document_type)?;
    let view = WizardView::from_wizard(&wizard);

    let mut wizards = state.uploads().wizards().await;
    if let Some(previous) = wizards.get(&admin.id) {
        if previous.is_in_flight() {
            return Err(ApiError::Conflict("A submission is already in progress".to_string()));
        }
    }
    let restarted = wizards.insert(admin.id.clone(), wizard).is_some();
    drop(wizards);

    tracing::info!(
        user_id = %admin.id,
        document_type = ?payload.document_type,
        restarted,
        "Upload wizard started"
    );
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_wizard(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<WizardView>, ApiError> {
    let wizards = state.uploads().wizards().await;
    let wizard = wizards.get(&admin.id).ok_or_else(no_wizard)?;
    Ok(Json(WizardView::from_wizard(wizard)))
}

async fn update_wizard(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<WizardPatch>,
) -> Result<Json<WizardView>, ApiError> {
    if let Some(Some(age)) = payload.age {
        if !(0..=150).contains(&age) {
            return Err(ApiError::BadRequest("Age must be between 0 and 150".to_string()));
        }
    }

    let mut wizards = state.uploads().wizards().await;
    let wizard = wizards.get_mut(&admin.id).ok_or_else(no_wizard)?;
    wizard.set_metadata(payload.into())?;
    Ok(Json(WizardView::from_wizard(wizard)))
}

async fn cancel_wizard(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut wizards = state.uploads().wizards().await;
    let Some(wizard) = wizards.get_mut(&admin.id) else {
        return Err(no_wizard());
    };
    if wizard.is_in_flight() {
        return Err(ApiError::Conflict("A submission is already in progress".to_string()));
    }
    wizard.clear();
    wizards.remove(&admin.id);

    tracing::info!(user_id = %admin.id, "Upload wizard cancelled");
    Ok(StatusCode::NO_CONTENT)
}

async fn add_files(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<WizardView>, ApiError> {
    let storage_settings = state.settings().storage();
    let max_bytes = storage_settings.max_upload_bytes() as usize;
    let mut staged = Vec::new();

    // Read the body before taking the wizard lock.
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Each file needs a file name".to_string()))?;
        let content_type =
            field.content_type().unwrap_or("application/octet-stream").to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::BadRequest(format!(
                    "File '{filename}' exceeds the {} MB limit",
                    storage_settings.max_upload_size_mb
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        validate_document_upload(
            &filename,
            &content_type,
            bytes.len(),
            &storage_settings.allowed_document_extensions,
            max_bytes,
        )?;
        staged.push(StagedFile { filename, content_type, bytes: Arc::from(bytes) });
    }

    if staged.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }

    let mut wizards = state.uploads().wizards().await;
    let wizard = wizards.get_mut(&admin.id).ok_or_else(no_wizard)?;
    let max_files = storage_settings.max_files_per_upload as usize;
    if wizard.files().len() + staged.len() > max_files {
        return Err(ApiError::BadRequest(format!("At most {max_files} files can be attached")));
    }
    let added = staged.len();
    for file in staged {
        wizard.add_file(file)?;
    }

    tracing::info!(user_id = %admin.id, added, total = wizard.files().len(), "Files staged");
    Ok(Json(WizardView::from_wizard(wizard)))
}

async fn remove_file(
    Path(index): Path<usize>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<WizardView>, ApiError> {
    let mut wizards = state.uploads().wizards().await;
    let wizard = wizards.get_mut(&admin.id).ok_or_else(no_wizard)?;
    let removed = wizard.remove_file(index)?;

    tracing::debug!(user_id = %admin.id, filename = %removed.filename, "Staged file removed");
    Ok(Json(WizardView::from_wizard(wizard)))
}

async fn submit_wizard(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiError> {
    let draft = {
        let mut wizards = state.uploads().wizards().await;
        let wizard = wizards.get_mut(&admin.id).ok_or_else(no_wizard)?;
        wizard.begin_submit(today_utc())?
    };

    // The wizard lock is released while storage and the database are busy;
    // the in-flight flag turns away a second submit meanwhile. The work runs
    // detached so a dropped connection cannot leave the flag set.
    let task_state = state.clone();
    let task_admin = admin.clone();
    let submission = state.uploads().spawn_submit(admin.id.clone(), async move {
        store_record(&task_state, &task_admin, draft).await
    });
    let record = match submission.await {
        Ok(Ok(result)) => result?,
        Ok(Err(err)) | Err(err) => {
            return Err(ApiError::internal(err, "Upload submission aborted"));
        }
    };
    metrics::record_upload(record.documents.len());
    tracing::info!(
        record_id = record.id,
        user_id = %admin.id,
        documents = record.documents.len(),
        "Patient record created from upload"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn store_record(
    state: &AppState,
    admin: &User,
    draft: RecordDraft,
) -> Result<RecordResponse, ApiError> {
    let doctor_ok = repositories::users::is_active_doctor(state.db(), &draft.doctor_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to verify doctor"))?;
    if !doctor_ok {
        return Err(ApiError::BadRequest("Assigned doctor does not exist or is inactive".to_string()));
    }

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let record = repositories::records::create(
        &mut *tx,
        repositories::records::CreateRecord {
            patient_name: draft.patient_name.as_deref(),
            age: draft.age,
            gender: draft.gender.as_deref(),
            contact: draft.contact.as_deref(),
            document_type: draft.document_type,
            doctor_id: &draft.doctor_id,
            extracted_text: draft.extracted_text.as_deref(),
            notes: draft.notes.as_deref(),
            created_by: &admin.id,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create patient record"))?;

    let entry = repositories::records::insert_entry(
        &mut *tx,
        repositories::records::CreateEntry {
            record_id: record.id,
            entry_date: draft.seed_entry.date,
            description: &draft.seed_entry.description,
            notes: &draft.seed_entry.notes,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create timeline entry"))?;

    let mut documents = Vec::with_capacity(draft.files.len());
    for file in &draft.files {
        let document_id = Uuid::new_v4().to_string();
        let stored = match state.storage() {
            Some(storage) => {
                let key = record_document_key(record.id, &document_id, &file.filename);
                Some(
                    storage
                        .upload_bytes(&key, &file.content_type, &file.bytes)
                        .await
                        .map_err(|e| ApiError::internal(e, "Failed to store document"))?,
                )
            }
            None => None,
        };

        let document = repositories::records::insert_document(
            &mut *tx,
            repositories::records::CreateDocument {
                id: &document_id,
                record_id: record.id,
                filename: &file.filename,
                content_type: &file.content_type,
                file_size: file.size() as i64,
                storage_key: stored.as_ref().map(|object| object.key.as_str()),
                sha256: stored.as_ref().map(|object| object.sha256.as_str()),
                now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to record document"))?;
        documents.push(document);
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit patient record"))?;

    if state.storage().is_none() {
        tracing::warn!(record_id = record.id, "Storage disabled; document bytes were not kept");
    }

    Ok(RecordResponse::assemble(record, &[entry], Vec::new(), documents))
}

/// Serves staged bytes to the user who uploaded them.
async fn preview(
    Path(token): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let file = state
        .uploads()
        .preview(&token, &user.id)
        .ok_or_else(|| ApiError::NotFound("Preview not found".to_string()))?;

    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        file.bytes.to_vec(),
    )
        .into_response())
}

fn no_wizard() -> ApiError {
    ApiError::NotFound("No upload in progress".to_string())
}
