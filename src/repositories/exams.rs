use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, PrimitiveDateTime};

use crate::db::models::Exam;
use crate::schemas::exam::QuestionPayload;

pub(crate) const COLUMNS: &str = "\
    id, exam_name, book_name, exam_date, duration_minutes, total_questions, \
    marks_per_question, total_marks, questions, created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_name: &'a str,
    pub(crate) book_name: &'a str,
    pub(crate) exam_date: Date,
    pub(crate) duration_minutes: i32,
    pub(crate) marks_per_question: f64,
    pub(crate) total_marks: f64,
    pub(crate) questions: &'a [QuestionPayload],
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateExam<'_>) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, exam_name, book_name, exam_date, duration_minutes, total_questions,
            marks_per_question, total_marks, questions, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_name)
    .bind(params.book_name)
    .bind(params.exam_date)
    .bind(params.duration_minutes)
    .bind(params.questions.len() as i32)
    .bind(params.marks_per_question)
    .bind(params.total_marks)
    .bind(Json(params.questions))
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn count_sessions(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_sessions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) struct ListExams {
    pub(crate) book_name: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &ListExams) {
    builder.push(" WHERE 1=1");
    if let Some(book_name) = params.book_name.as_ref() {
        builder.push(" AND book_name ILIKE ");
        builder.push_bind(format!("%{}%", book_name.trim()));
    }
    if let Some(created_by) = params.created_by.as_ref() {
        builder.push(" AND created_by = ");
        builder.push_bind(created_by.clone());
    }
}

pub(crate) async fn list(pool: &PgPool, params: &ListExams) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exams"));
    push_filters(&mut builder, params);

    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(params.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(params.limit.clamp(1, 1000));

    builder.build_query_as::<Exam>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, params: &ListExams) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exams");
    push_filters(&mut builder, params);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
