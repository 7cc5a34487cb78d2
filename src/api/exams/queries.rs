use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct ListExamsQuery {
    #[serde(default)]
    pub(super) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(super) limit: i64,
    #[serde(default)]
    #[serde(alias = "bookName")]
    pub(super) book_name: Option<String>,
    /// Restricts the list to exams authored by the caller.
    #[serde(default)]
    pub(super) mine: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteExamQuery {
    #[serde(default)]
    #[serde(alias = "forceDelete")]
    pub(super) force_delete: bool,
}
