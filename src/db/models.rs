use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::{Date, PrimitiveDateTime};

use crate::db::types::{DocumentType, SessionStatus, UserRole};
use crate::schemas::exam::QuestionPayload;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Book {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) subject: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) exam_name: String,
    pub(crate) book_name: String,
    pub(crate) exam_date: Date,
    pub(crate) duration_minutes: i32,
    pub(crate) total_questions: i32,
    pub(crate) marks_per_question: f64,
    pub(crate) total_marks: f64,
    pub(crate) questions: Json<Vec<QuestionPayload>>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSession {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: SessionStatus,
    pub(crate) current_index: i32,
    pub(crate) selections: Json<BTreeMap<usize, usize>>,
    pub(crate) locked: Json<Vec<usize>>,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PatientRecord {
    pub(crate) id: i64,
    pub(crate) patient_name: Option<String>,
    pub(crate) age: Option<i32>,
    pub(crate) gender: Option<String>,
    pub(crate) contact: Option<String>,
    pub(crate) document_type: DocumentType,
    pub(crate) doctor_id: String,
    pub(crate) extracted_text: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TimelineEntry {
    pub(crate) id: i64,
    pub(crate) record_id: i64,
    pub(crate) entry_date: Date,
    pub(crate) description: String,
    pub(crate) notes: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TimelineReview {
    pub(crate) record_id: i64,
    pub(crate) entry_key: String,
    pub(crate) review: Option<String>,
    pub(crate) tags: Json<Vec<String>>,
    pub(crate) reviewer_id: String,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct RecordDocument {
    pub(crate) id: String,
    pub(crate) record_id: i64,
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) file_size: i64,
    pub(crate) storage_key: Option<String>,
    pub(crate) sha256: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}
