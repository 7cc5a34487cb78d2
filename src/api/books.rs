use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAuthor, CurrentUser};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::book::{BookCreate, BookListQuery, BookResponse, BookUpdate};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/:book_id", get(get_book).patch(update_book).delete(delete_book))
}

async fn list_books(
    Query(params): Query<BookListQuery>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let search = params.search.as_deref().map(str::trim).filter(|value| !value.is_empty());
    let books = repositories::books::list(state.db(), search, params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list books"))?;

    Ok(Json(books.into_iter().map(BookResponse::from_db).collect()))
}

async fn get_book(
    Path(book_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<BookResponse>, ApiError> {
    let book = repositories::books::find_by_id(state.db(), &book_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch book"))?
        .ok_or_else(|| ApiError::NotFound("Book not found".to_string()))?;

    Ok(Json(BookResponse::from_db(book)))
}

async fn create_book(
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<BookCreate>,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    validate_payload(&payload)?;
    let title = payload.title.trim();
    let book_author = payload.author.trim();

    let duplicate = repositories::books::exists_by_title_author(state.db(), title, book_author, None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing book"))?;
    if duplicate {
        return Err(ApiError::Conflict("Book with this title and author already exists".to_string()));
    }

    let subject = payload.subject.as_deref().map(str::trim).filter(|value| !value.is_empty());
    let book = repositories::books::create(
        state.db(),
        repositories::books::CreateBook {
            id: &Uuid::new_v4().to_string(),
            title,
            author: book_author,
            subject,
            created_by: &author.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create book"))?;

    tracing::info!(book_id = %book.id, user_id = %author.id, "Book created");
    Ok((StatusCode::CREATED, Json(BookResponse::from_db(book))))
}

async fn update_book(
    Path(book_id): Path<String>,
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<BookUpdate>,
) -> Result<Json<BookResponse>, ApiError> {
    validate_payload(&payload)?;

    let existing = repositories::books::find_by_id(state.db(), &book_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch book"))?
        .ok_or_else(|| ApiError::NotFound("Book not found".to_string()))?;

    let title = payload.title.as_deref().map(str::trim).unwrap_or(&existing.title);
    let book_author = payload.author.as_deref().map(str::trim).unwrap_or(&existing.author);
    let duplicate =
        repositories::books::exists_by_title_author(state.db(), title, book_author, Some(&book_id))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check existing book"))?;
    if duplicate {
        return Err(ApiError::Conflict("Book with this title and author already exists".to_string()));
    }

    let book = repositories::books::update(
        state.db(),
        &book_id,
        repositories::books::UpdateBook {
            title: payload.title.map(|value| value.trim().to_string()),
            author: payload.author.map(|value| value.trim().to_string()),
            subject: payload.subject.map(|value| value.trim().to_string()),
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update book"))?
    .ok_or_else(|| ApiError::NotFound("Book not found".to_string()))?;

    tracing::info!(book_id = %book.id, user_id = %author.id, "Book updated");
    Ok(Json(BookResponse::from_db(book)))
}

async fn delete_book(
    Path(book_id): Path<String>,
    CurrentAuthor(author): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::books::delete_by_id(state.db(), &book_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete book"))?;
    if !deleted {
        return Err(ApiError::NotFound("Book not found".to_string()));
    }

    tracing::info!(book_id = %book_id, user_id = %author.id, "Book deleted");
    Ok(StatusCode::NO_CONTENT)
}
