use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Book;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BookCreate {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[validate(length(min = 1, max = 255, message = "author must be 1-255 characters"))]
    pub(crate) author: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "subject must be at most 255 characters"))]
    pub(crate) subject: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BookUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "author must be 1-255 characters"))]
    pub(crate) author: Option<String>,
    #[serde(default)]
    #[validate(length(max = 255, message = "subject must be at most 255 characters"))]
    pub(crate) subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookListQuery {
    #[serde(default)]
    pub(crate) search: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct BookResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) subject: Option<String>,
    pub(crate) created_at: String,
}

impl BookResponse {
    pub(crate) fn from_db(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            subject: book.subject,
            created_at: format_primitive(book.created_at),
        }
    }
}
