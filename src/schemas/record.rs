use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::core::time::{format_date, format_primitive};
use crate::db::models::{PatientRecord, RecordDocument, TimelineEntry, TimelineReview};
use crate::db::types::DocumentType;
use crate::services::timeline::{entry_key, sorted_entries, Dated};

impl Dated for TimelineEntry {
    fn date(&self) -> Date {
        self.entry_date
    }

    fn stable_id(&self) -> Option<i64> {
        Some(self.id)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordListQuery {
    #[serde(default)]
    pub(crate) doctor_id: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimelineEntryCreate {
    pub(crate) date: String,
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) notes: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) review: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsRequest {
    #[serde(default)]
    pub(crate) tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TimelineEntryResponse {
    pub(crate) key: String,
    pub(crate) id: i64,
    pub(crate) date: String,
    pub(crate) description: String,
    pub(crate) notes: String,
    pub(crate) review: Option<String>,
    pub(crate) tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub(crate) entry_key: String,
    pub(crate) review: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) reviewer_id: String,
    pub(crate) updated_at: String,
}

impl ReviewResponse {
    pub(crate) fn from_db(review: TimelineReview) -> Self {
        Self {
            entry_key: review.entry_key,
            review: review.review,
            tags: review.tags.0,
            reviewer_id: review.reviewer_id,
            updated_at: format_primitive(review.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DocumentResponse {
    pub(crate) id: String,
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) file_size: i64,
    pub(crate) stored: bool,
    pub(crate) created_at: String,
}

impl DocumentResponse {
    pub(crate) fn from_db(document: RecordDocument) -> Self {
        Self {
            id: document.id,
            filename: document.filename,
            content_type: document.content_type,
            file_size: document.file_size,
            stored: document.storage_key.is_some(),
            created_at: format_primitive(document.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DocumentDownloadResponse {
    pub(crate) url: String,
    pub(crate) expires_in: u64,
}

/// Row in the records list; the timeline is only loaded for the detail view.
#[derive(Debug, Serialize)]
pub(crate) struct RecordSummary {
    pub(crate) id: i64,
    pub(crate) patient_name: Option<String>,
    pub(crate) age: Option<i32>,
    pub(crate) gender: Option<String>,
    pub(crate) document_type: DocumentType,
    pub(crate) document_label: &'static str,
    pub(crate) doctor_id: String,
    pub(crate) created_at: String,
}

impl RecordSummary {
    pub(crate) fn from_db(record: PatientRecord) -> Self {
        Self {
            id: record.id,
            patient_name: record.patient_name,
            age: record.age,
            gender: record.gender,
            document_type: record.document_type,
            document_label: record.document_type.label(),
            doctor_id: record.doctor_id,
            created_at: format_primitive(record.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RecordResponse {
    pub(crate) id: i64,
    pub(crate) patient_name: Option<String>,
    pub(crate) age: Option<i32>,
    pub(crate) gender: Option<String>,
    pub(crate) contact: Option<String>,
    pub(crate) document_type: DocumentType,
    pub(crate) document_label: &'static str,
    pub(crate) doctor_id: String,
    pub(crate) extracted_text: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) timeline: Vec<TimelineEntryResponse>,
    pub(crate) documents: Vec<DocumentResponse>,
}

impl RecordResponse {
    /// Sorts the timeline and attaches reviews by entry key.
    pub(crate) fn assemble(
        record: PatientRecord,
        entries: &[TimelineEntry],
        reviews: Vec<TimelineReview>,
        documents: Vec<RecordDocument>,
    ) -> Self {
        let mut reviews: HashMap<String, TimelineReview> =
            reviews.into_iter().map(|review| (review.entry_key.clone(), review)).collect();

        let timeline = sorted_entries(entries)
            .into_iter()
            .enumerate()
            .map(|(position, entry)| {
                let key = entry_key(&entry, position);
                let review = reviews.remove(&key);
                TimelineEntryResponse {
                    id: entry.id,
                    date: format_date(entry.entry_date),
                    description: entry.description,
                    notes: entry.notes,
                    review: review.as_ref().and_then(|review| review.review.clone()),
                    tags: review.map(|review| review.tags.0).unwrap_or_default(),
                    key,
                }
            })
            .collect();

        Self {
            id: record.id,
            patient_name: record.patient_name,
            age: record.age,
            gender: record.gender,
            contact: record.contact,
            document_type: record.document_type,
            document_label: record.document_type.label(),
            doctor_id: record.doctor_id,
            extracted_text: record.extracted_text,
            notes: record.notes,
            created_by: record.created_by,
            created_at: format_primitive(record.created_at),
            updated_at: format_primitive(record.updated_at),
            timeline,
            documents: documents.into_iter().map(DocumentResponse::from_db).collect(),
        }
    }
}
