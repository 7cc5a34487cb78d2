use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAuthor;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::exam::ExamPayload;
use crate::services::exam_export;

use super::super::helpers;
use super::super::queries::DeleteExamQuery;

pub(in crate::api::exams) async fn delete_exam(
    Path(exam_id): Path<String>,
    Query(params): Query<DeleteExamQuery>,
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = helpers::fetch_exam(state.db(), &exam_id).await?;

    let sessions = repositories::exams::count_sessions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exam sessions"))?;
    if sessions > 0 && !params.force_delete {
        return Err(ApiError::Conflict(format!(
            "Exam has {sessions} session(s); pass force_delete=true to delete it anyway"
        )));
    }

    repositories::exams::delete_by_id(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    tracing::info!(
        exam_id = %exam.id,
        user_id = %author.id,
        sessions_deleted = sessions,
        "Exam deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub(in crate::api::exams) async fn export_exam(
    Path(exam_id): Path<String>,
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let exam = ExamPayload::from_db(helpers::fetch_exam(state.db(), &exam_id).await?);
    tracing::info!(exam_id = %exam_id, user_id = %author.id, "Exporting exam PDF");
    pdf_response(&state, &exam)
}

/// Export for an exam that only exists in the builder.
pub(in crate::api::exams) async fn export_payload(
    CurrentAuthor(_author): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<ExamPayload>,
) -> Result<Response, ApiError> {
    let exam = helpers::accept_payload(payload, state.settings().exam().max_questions_per_exam)?;
    pdf_response(&state, &exam)
}

fn pdf_response(state: &AppState, exam: &ExamPayload) -> Result<Response, ApiError> {
    let bytes = exam_export::export_exam(exam, state.settings().exam().pdf_page_break_mm)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        exam_export::export_filename(&exam.exam_name)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::internal(e, "Failed to build export headers"))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
