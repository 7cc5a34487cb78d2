use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, PrimitiveDateTime};

use crate::db::models::{PatientRecord, RecordDocument, TimelineEntry, TimelineReview};
use crate::db::types::DocumentType;

const RECORD_COLUMNS: &str = "\
    id, patient_name, age, gender, contact, document_type, doctor_id, \
    extracted_text, notes, created_by, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, record_id, entry_date, description, notes, created_at";
const REVIEW_COLUMNS: &str = "record_id, entry_key, review, tags, reviewer_id, updated_at";
const DOCUMENT_COLUMNS: &str =
    "id, record_id, filename, content_type, file_size, storage_key, sha256, created_at";

pub(crate) struct CreateRecord<'a> {
    pub(crate) patient_name: Option<&'a str>,
    pub(crate) age: Option<i32>,
    pub(crate) gender: Option<&'a str>,
    pub(crate) contact: Option<&'a str>,
    pub(crate) document_type: DocumentType,
    pub(crate) doctor_id: &'a str,
    pub(crate) extracted_text: Option<&'a str>,
    pub(crate) notes: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateRecord<'_>,
) -> Result<PatientRecord, sqlx::Error> {
    sqlx::query_as::<_, PatientRecord>(&format!(
        "INSERT INTO patient_records (
            patient_name, age, gender, contact, document_type, doctor_id,
            extracted_text, notes, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10)
        RETURNING {RECORD_COLUMNS}"
    ))
    .bind(params.patient_name)
    .bind(params.age)
    .bind(params.gender)
    .bind(params.contact)
    .bind(params.document_type)
    .bind(params.doctor_id)
    .bind(params.extracted_text)
    .bind(params.notes)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: i64,
) -> Result<Option<PatientRecord>, sqlx::Error> {
    sqlx::query_as::<_, PatientRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM patient_records WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Newest first. `doctor_id` limits the list to one assignee.
pub(crate) async fn list(
    pool: &PgPool,
    doctor_id: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<PatientRecord>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {RECORD_COLUMNS} FROM patient_records"));
    if let Some(doctor_id) = doctor_id {
        builder.push(" WHERE doctor_id = ");
        builder.push_bind(doctor_id);
    }
    builder.push(" ORDER BY id DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<PatientRecord>().fetch_all(pool).await
}

pub(crate) async fn touch(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE patient_records SET updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) struct CreateEntry<'a> {
    pub(crate) record_id: i64,
    pub(crate) entry_date: Date,
    pub(crate) description: &'a str,
    pub(crate) notes: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn insert_entry(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateEntry<'_>,
) -> Result<TimelineEntry, sqlx::Error> {
    sqlx::query_as::<_, TimelineEntry>(&format!(
        "INSERT INTO timeline_entries (record_id, entry_date, description, notes, created_at)
         VALUES ($1,$2,$3,$4,$5)
         RETURNING {ENTRY_COLUMNS}"
    ))
    .bind(params.record_id)
    .bind(params.entry_date)
    .bind(params.description)
    .bind(params.notes)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

/// Insertion order; callers sort by date for display.
pub(crate) async fn list_entries(
    pool: &PgPool,
    record_id: i64,
) -> Result<Vec<TimelineEntry>, sqlx::Error> {
    sqlx::query_as::<_, TimelineEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM timeline_entries WHERE record_id = $1 ORDER BY id"
    ))
    .bind(record_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_reviews(
    pool: &PgPool,
    record_id: i64,
) -> Result<Vec<TimelineReview>, sqlx::Error> {
    sqlx::query_as::<_, TimelineReview>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM timeline_reviews WHERE record_id = $1"
    ))
    .bind(record_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn upsert_review_text(
    pool: &PgPool,
    record_id: i64,
    entry_key: &str,
    review: &str,
    reviewer_id: &str,
    now: PrimitiveDateTime,
) -> Result<TimelineReview, sqlx::Error> {
    sqlx::query_as::<_, TimelineReview>(&format!(
        "INSERT INTO timeline_reviews (record_id, entry_key, review, tags, reviewer_id, updated_at)
         VALUES ($1,$2,$3,'[]'::jsonb,$4,$5)
         ON CONFLICT (record_id, entry_key) DO UPDATE
         SET review = EXCLUDED.review,
             reviewer_id = EXCLUDED.reviewer_id,
             updated_at = EXCLUDED.updated_at
         RETURNING {REVIEW_COLUMNS}"
    ))
    .bind(record_id)
    .bind(entry_key)
    .bind(review)
    .bind(reviewer_id)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn upsert_review_tags(
    pool: &PgPool,
    record_id: i64,
    entry_key: &str,
    tags: &[String],
    reviewer_id: &str,
    now: PrimitiveDateTime,
) -> Result<TimelineReview, sqlx::Error> {
    sqlx::query_as::<_, TimelineReview>(&format!(
        "INSERT INTO timeline_reviews (record_id, entry_key, review, tags, reviewer_id, updated_at)
         VALUES ($1,$2,NULL,$3,$4,$5)
         ON CONFLICT (record_id, entry_key) DO UPDATE
         SET tags = EXCLUDED.tags,
             reviewer_id = EXCLUDED.reviewer_id,
             updated_at = EXCLUDED.updated_at
         RETURNING {REVIEW_COLUMNS}"
    ))
    .bind(record_id)
    .bind(entry_key)
    .bind(Json(tags))
    .bind(reviewer_id)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) struct CreateDocument<'a> {
    pub(crate) id: &'a str,
    pub(crate) record_id: i64,
    pub(crate) filename: &'a str,
    pub(crate) content_type: &'a str,
    pub(crate) file_size: i64,
    pub(crate) storage_key: Option<&'a str>,
    pub(crate) sha256: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn insert_document(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateDocument<'_>,
) -> Result<RecordDocument, sqlx::Error> {
    sqlx::query_as::<_, RecordDocument>(&format!(
        "INSERT INTO record_documents (
            id, record_id, filename, content_type, file_size, storage_key, sha256, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        RETURNING {DOCUMENT_COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.record_id)
    .bind(params.filename)
    .bind(params.content_type)
    .bind(params.file_size)
    .bind(params.storage_key)
    .bind(params.sha256)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_documents(
    pool: &PgPool,
    record_id: i64,
) -> Result<Vec<RecordDocument>, sqlx::Error> {
    sqlx::query_as::<_, RecordDocument>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM record_documents WHERE record_id = $1 ORDER BY created_at"
    ))
    .bind(record_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_document(
    pool: &PgPool,
    record_id: i64,
    document_id: &str,
) -> Result<Option<RecordDocument>, sqlx::Error> {
    sqlx::query_as::<_, RecordDocument>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM record_documents WHERE record_id = $1 AND id = $2"
    ))
    .bind(record_id)
    .bind(document_id)
    .fetch_optional(pool)
    .await
}
