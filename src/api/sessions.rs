use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamSession, User};
use crate::db::types::{SessionStatus, UserRole};
use crate::repositories;
use crate::schemas::exam::ExamPayload;
use crate::schemas::session::{
    AnswerRequest, AnswerResponse, NavigateAction, NavigateRequest, SessionResponse,
    SessionResultResponse,
};
use crate::services::exam_session::ExamSessionController;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:session_id", get(get_session))
        .route("/:session_id/answers", post(answer))
        .route("/:session_id/navigate", post(navigate))
        .route("/:session_id/submit", post(submit))
        .route("/:session_id/results", get(results))
}

/// Starts a session over a saved exam, or resumes the caller's unfinished one.
pub(crate) async fn start_session(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    let exam = ExamPayload::from_db(exam);

    let mut tx = begin(&state).await?;

    if let Some(session) = find_open(&mut tx, &exam_id, &user).await? {
        tx.rollback().await.map_err(|e| ApiError::internal(e, "Failed to end transaction"))?;
        return Ok(resumed(exam, &session));
    }

    let mut controller = ExamSessionController::new(exam);
    controller.start()?;

    let created = repositories::sessions::create_if_none_open(
        &mut *tx,
        repositories::sessions::CreateSession {
            id: &Uuid::new_v4().to_string(),
            exam_id: &exam_id,
            student_id: &user.id,
            snapshot: &controller.snapshot(),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam session"))?;

    // A concurrent start won the open-session slot; hand back that session.
    let Some(session) = created else {
        let session = find_open(&mut tx, &exam_id, &user).await?.ok_or_else(|| {
            ApiError::Conflict("Exam session changed concurrently, try again".to_string())
        })?;
        tx.rollback().await.map_err(|e| ApiError::internal(e, "Failed to end transaction"))?;
        return Ok(resumed(controller.exam().clone(), &session));
    };

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit exam session"))?;

    tracing::info!(
        session_id = %session.id,
        exam_id = %exam_id,
        user_id = %user.id,
        total_questions = controller.total(),
        "Exam session started"
    );

    Ok((StatusCode::CREATED, Json(SessionResponse::new(&session, &controller))))
}

async fn find_open(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    user: &User,
) -> Result<Option<ExamSession>, ApiError> {
    repositories::sessions::find_open(&mut **tx, exam_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up open session"))
}

fn resumed(exam: ExamPayload, session: &ExamSession) -> (StatusCode, Json<SessionResponse>) {
    let controller =
        ExamSessionController::restore(exam, repositories::sessions::snapshot_of(session));
    (StatusCode::OK, Json(SessionResponse::new(session, &controller)))
}

async fn get_session(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = repositories::sessions::find_by_id(state.db(), &session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam session"))?
        .ok_or_else(|| ApiError::NotFound("Exam session not found".to_string()))?;
    ensure_can_view(&session, &user)?;

    let controller = restore(&state, &session).await?;
    Ok(Json(SessionResponse::new(&session, &controller)))
}

async fn answer(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let mut tx = begin(&state).await?;
    let (_, mut controller) = lock_owned_session(&state, &mut tx, &session_id, &user).await?;

    let outcome = controller.select_answer(payload.question_index, payload.option_index)?;
    persist(&mut tx, &session_id, &controller).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer"))?;

    metrics::record_answer(outcome.label());
    tracing::debug!(
        session_id = %session_id,
        question_index = payload.question_index,
        outcome = outcome.label(),
        "Answer processed"
    );

    Ok(Json(AnswerResponse {
        outcome,
        question_index: payload.question_index,
        attempted: controller.selections().len(),
    }))
}

async fn navigate(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut tx = begin(&state).await?;
    let (_, mut controller) = lock_owned_session(&state, &mut tx, &session_id, &user).await?;

    match payload.action {
        NavigateAction::Next => controller.next()?,
        NavigateAction::Previous => controller.previous()?,
        NavigateAction::Goto => {
            let index = payload.index.ok_or_else(|| {
                ApiError::BadRequest("index is required for the goto action".to_string())
            })?;
            controller.go_to(index)?
        }
    };

    let session = persist(&mut tx, &session_id, &controller).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit navigation"))?;

    Ok(Json(SessionResponse::new(&session, &controller)))
}

async fn submit(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResultResponse>, ApiError> {
    let mut tx = begin(&state).await?;
    let (_, mut controller) = lock_owned_session(&state, &mut tx, &session_id, &user).await?;

    let stats = controller.submit()?;
    persist(&mut tx, &session_id, &controller).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit submission"))?;

    metrics::record_session_submitted();
    tracing::info!(
        session_id = %session_id,
        user_id = %user.id,
        attempted = stats.attempted,
        correct = stats.correct,
        total = stats.total,
        "Exam session submitted"
    );

    Ok(Json(SessionResultResponse::new(&session_id, &controller)))
}

async fn results(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResultResponse>, ApiError> {
    let session = repositories::sessions::find_by_id(state.db(), &session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam session"))?
        .ok_or_else(|| ApiError::NotFound("Exam session not found".to_string()))?;
    ensure_can_view(&session, &user)?;

    if session.status != SessionStatus::Submitted {
        return Err(ApiError::BadRequest(
            "Results are available after the exam is submitted".to_string(),
        ));
    }

    let controller = restore(&state, &session).await?;
    Ok(Json(SessionResultResponse::new(&session.id, &controller)))
}

async fn begin(state: &AppState) -> Result<Transaction<'static, Postgres>, ApiError> {
    state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))
}

/// Owners see their sessions; admins and professors may inspect any.
fn ensure_can_view(session: &ExamSession, user: &User) -> Result<(), ApiError> {
    if session.student_id == user.id || user.role.is_author() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access denied"))
    }
}

async fn restore(
    state: &AppState,
    session: &ExamSession,
) -> Result<ExamSessionController, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &session.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    Ok(ExamSessionController::restore(
        ExamPayload::from_db(exam),
        repositories::sessions::snapshot_of(session),
    ))
}

/// Loads the session with a row lock so concurrent answers serialize.
async fn lock_owned_session(
    state: &AppState,
    tx: &mut Transaction<'static, Postgres>,
    session_id: &str,
    user: &User,
) -> Result<(ExamSession, ExamSessionController), ApiError> {
    let session = repositories::sessions::find_for_update(&mut **tx, session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock exam session"))?
        .ok_or_else(|| ApiError::NotFound("Exam session not found".to_string()))?;

    if session.student_id != user.id {
        tracing::warn!(
            session_id = %session_id,
            user_id = %user.id,
            is_admin = user.role == UserRole::Admin,
            "Rejected change to another user's exam session"
        );
        return Err(ApiError::Forbidden("Only the session owner can change it"));
    }

    let controller = restore(state, &session).await?;
    Ok((session, controller))
}

async fn persist(
    tx: &mut Transaction<'static, Postgres>,
    session_id: &str,
    controller: &ExamSessionController,
) -> Result<ExamSession, ApiError> {
    repositories::sessions::save_snapshot(
        &mut **tx,
        session_id,
        &controller.snapshot(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save exam session"))
}
