use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Book;

const COLUMNS: &str = "id, title, author, subject, created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>(&format!("SELECT {COLUMNS} FROM books WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn exists_by_title_author(
    pool: &PgPool,
    title: &str,
    author: &str,
    exclude_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(
            SELECT 1 FROM books
            WHERE LOWER(title) = LOWER($1) AND LOWER(author) = LOWER($2)
              AND ($3::varchar IS NULL OR id <> $3)
        )",
    )
    .bind(title)
    .bind(author)
    .bind(exclude_id)
    .fetch_one(pool)
    .await
}

pub(crate) struct CreateBook<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) author: &'a str,
    pub(crate) subject: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) now: time::PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateBook<'_>) -> Result<Book, sqlx::Error> {
    sqlx::query_as::<_, Book>(&format!(
        "INSERT INTO books (id, title, author, subject, created_by, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$6)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.author)
    .bind(params.subject)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) struct UpdateBook {
    pub(crate) title: Option<String>,
    pub(crate) author: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateBook,
) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>(&format!(
        "UPDATE books SET
            title = COALESCE($1, title),
            author = COALESCE($2, author),
            subject = COALESCE($3, subject),
            updated_at = $4
         WHERE id = $5
         RETURNING {COLUMNS}"
    ))
    .bind(params.title)
    .bind(params.author)
    .bind(params.subject)
    .bind(params.updated_at)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM books WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list(
    pool: &PgPool,
    search: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Book>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM books"));

    if let Some(search) = search {
        let pattern = format!("%{}%", search.trim());
        builder.push(" WHERE title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR author ILIKE ");
        builder.push_bind(pattern);
    }

    builder.push(" ORDER BY title OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Book>().fetch_all(pool).await
}
