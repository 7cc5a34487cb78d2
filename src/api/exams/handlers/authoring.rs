use axum::{extract::State, http::StatusCode, Json};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAuthor;
use crate::api::validation::validate_payload;
use crate::core::metrics;
use crate::core::redis::RateLimitPolicy;
use crate::core::state::AppState;
use crate::schemas::exam::{
    ExamGenerateRequest, ExamGenerateResponse, ExamPayload, PreviewPageRequest,
    PreviewPageResponse, PreviewScoreRequest, PreviewStep, ScoreResponse,
};
use crate::services::exam_preview::ExamPreview;
use crate::services::scoring;

use super::super::helpers::{self, PgExamSaver};

pub(in crate::api::exams) async fn generate_exam(
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<ExamGenerateRequest>,
) -> Result<Json<ExamGenerateResponse>, ApiError> {
    validate_payload(&payload)?;
    let max_questions = state.settings().exam().max_questions_per_exam;
    if payload.total_questions as u64 > max_questions {
        return Err(ApiError::BadRequest(format!(
            "An exam can have at most {max_questions} questions"
        )));
    }

    if !state.redis().allow(RateLimitPolicy::EXAM_GENERATION, &author.id).await {
        return Err(ApiError::TooManyRequests("Too many generation requests, try again later"));
    }

    let generator = state.generator().ok_or_else(|| {
        ApiError::ServiceUnavailable("Exam generation is not configured".to_string())
    })?;

    let generated = match generator.generate(&payload).await {
        Ok(generated) => generated,
        Err(err) => {
            metrics::record_generation("error");
            tracing::error!(
                user_id = %author.id,
                book_name = %payload.book_name,
                error = %err,
                "Exam generation failed"
            );
            return Err(ApiError::ServiceUnavailable(
                "Exam generation failed, try again later".to_string(),
            ));
        }
    };

    metrics::record_generation(if generated.warnings.is_empty() { "ok" } else { "warnings" });
    tracing::info!(
        user_id = %author.id,
        questions = generated.exam.questions.len(),
        warnings = generated.warnings.len(),
        "Exam generated"
    );

    Ok(Json(ExamGenerateResponse { exam: generated.exam, warnings: generated.warnings }))
}

/// Scores a set of answers against an unsaved exam without persisting anything.
pub(in crate::api::exams) async fn score_preview(
    CurrentAuthor(_author): CurrentAuthor,
    Json(payload): Json<PreviewScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let mut preview = ExamPreview::new(payload.exam.normalized());
    for (&question_index, &option_index) in &payload.answers {
        preview.select_answer(question_index, option_index)?;
    }

    Ok(Json(ScoreResponse::new(
        preview.compute_stats(),
        preview.marks_obtained(),
        scoring::total_marks(preview.exam()),
    )))
}

/// Renders one page of an unsaved exam with the author's local answers.
pub(in crate::api::exams) async fn preview_page(
    CurrentAuthor(_author): CurrentAuthor,
    Json(payload): Json<PreviewPageRequest>,
) -> Result<Json<PreviewPageResponse>, ApiError> {
    let mut preview = ExamPreview::new(payload.exam.normalized());
    for (&question_index, &option_index) in &payload.answers {
        preview.select_answer(question_index, option_index)?;
    }
    if let Some(question_index) = payload.clear {
        preview.clear_answer(question_index);
    }

    preview.go_to_page(payload.page)?;
    match payload.step {
        Some(PreviewStep::Next) => {
            preview.next();
        }
        Some(PreviewStep::Previous) => {
            preview.previous();
        }
        None => {}
    }

    let question = preview
        .current_question()
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("Exam has no questions".to_string()))?;
    let page = preview.current_page();
    let total = preview.total();

    Ok(Json(PreviewPageResponse {
        page,
        total,
        has_previous: page > 1,
        has_next: page < total,
        question,
        selected_option: preview.selections().get(&preview.current_index()).copied(),
        answers: preview.selections().clone(),
        score: ScoreResponse::new(
            preview.compute_stats(),
            preview.marks_obtained(),
            scoring::total_marks(preview.exam()),
        ),
    }))
}

pub(in crate::api::exams) async fn create_exam(
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<ExamPayload>,
) -> Result<(StatusCode, Json<ExamPayload>), ApiError> {
    let exam = helpers::accept_payload(payload, state.settings().exam().max_questions_per_exam)?;
    let ambiguous = exam.ambiguous_questions();
    if !ambiguous.is_empty() {
        tracing::warn!(
            user_id = %author.id,
            questions = ?ambiguous,
            "Saving exam with questions lacking a single correct option"
        );
    }

    let saver = PgExamSaver { pool: state.db(), author_id: &author.id };
    let exam_id = ExamPreview::new(exam).save(&saver).await?;

    let saved = helpers::fetch_exam(state.db(), &exam_id).await?;
    tracing::info!(
        exam_id = %saved.id,
        user_id = %author.id,
        total_questions = saved.total_questions,
        "Exam saved"
    );

    Ok((StatusCode::CREATED, Json(ExamPayload::from_db(saved))))
}
