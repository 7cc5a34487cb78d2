use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{PageQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::exam::{ExamPayload, ExamSummaryResponse, StudentExamResponse};

use super::super::helpers;
use super::super::queries::ListExamsQuery;

pub(in crate::api::exams) async fn list_exams(
    Query(params): Query<ListExamsQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<ExamSummaryResponse>>, ApiError> {
    let page = PageQuery { skip: params.skip, limit: params.limit }.normalized();
    let filters = repositories::exams::ListExams {
        book_name: params.book_name.filter(|value| !value.trim().is_empty()),
        created_by: params.mine.then(|| user.id.clone()),
        skip: page.skip,
        limit: page.limit,
    };

    let exams = repositories::exams::list(state.db(), &filters)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    let total = repositories::exams::count(state.db(), &filters)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;

    Ok(Json(PaginatedResponse::new(
        exams.iter().map(ExamSummaryResponse::from_db).collect(),
        total,
        page,
    )))
}

/// Authors get the full exam with the answer key; everyone else the
/// question stems and options only.
pub(in crate::api::exams) async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let exam = helpers::fetch_exam(state.db(), &exam_id).await?;

    if user.role.is_author() {
        Ok(Json(ExamPayload::from_db(exam)).into_response())
    } else {
        Ok(Json(StudentExamResponse::from_db(&exam)).into_response())
    }
}
