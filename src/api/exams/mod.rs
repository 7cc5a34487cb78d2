mod handlers;
mod helpers;
mod queries;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam).get(handlers::list_exams))
        .route("/generate", post(handlers::generate_exam))
        .route("/preview/page", post(handlers::preview_page))
        .route("/preview/score", post(handlers::score_preview))
        .route("/export", post(handlers::export_payload))
        .route("/:exam_id", get(handlers::get_exam).delete(handlers::delete_exam))
        .route("/:exam_id/export", get(handlers::export_exam))
        .route("/:exam_id/sessions", post(crate::api::sessions::start_session))
}

#[cfg(test)]
mod tests;
