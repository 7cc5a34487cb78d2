use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::validation::validate_payload;
use crate::core::time::{parse_date, primitive_now_utc};
use crate::db::models::Exam;
use crate::repositories;
use crate::schemas::exam::ExamPayload;
use crate::services::exam_preview::ExamSaver;

/// Writes builder output to the `exams` table on behalf of `author_id`.
pub(super) struct PgExamSaver<'a> {
    pub(super) pool: &'a PgPool,
    pub(super) author_id: &'a str,
}

#[async_trait]
impl ExamSaver for PgExamSaver<'_> {
    async fn save_exam(&self, exam: &ExamPayload) -> anyhow::Result<String> {
        let exam_date = parse_date(&exam.date)
            .ok_or_else(|| anyhow::anyhow!("invalid exam date '{}'", exam.date))?;
        let id = Uuid::new_v4().to_string();

        repositories::exams::create(
            self.pool,
            repositories::exams::CreateExam {
                id: &id,
                exam_name: exam.exam_name.trim(),
                book_name: exam.book_name.trim(),
                exam_date,
                duration_minutes: exam.duration,
                marks_per_question: exam.marks_per_question,
                total_marks: exam.total_marks,
                questions: &exam.questions,
                created_by: self.author_id,
                now: primitive_now_utc(),
            },
        )
        .await?;

        Ok(id)
    }
}

/// Validates an exam submitted by a client and recomputes its derived fields.
pub(super) fn accept_payload(exam: ExamPayload, max_questions: u64) -> Result<ExamPayload, ApiError> {
    validate_payload(&exam)?;
    if exam.questions.len() as u64 > max_questions {
        return Err(ApiError::BadRequest(format!(
            "An exam can have at most {max_questions} questions"
        )));
    }
    Ok(exam.normalized())
}

pub(super) async fn fetch_exam(pool: &PgPool, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(pool, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}
