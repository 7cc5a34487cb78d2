use std::collections::BTreeSet;

use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ExamSession;
use crate::db::types::SessionStatus;
use crate::services::exam_session::SessionSnapshot;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, status, current_index, selections, locked, \
    started_at, submitted_at, created_at, updated_at";

pub(crate) struct CreateSession<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) snapshot: &'a SessionSnapshot,
    pub(crate) now: PrimitiveDateTime,
}

/// Inserts the session unless the student already has an open one on the
/// exam, in which case `None` is returned and nothing is written.
pub(crate) async fn create_if_none_open(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateSession<'_>,
) -> Result<Option<ExamSession>, sqlx::Error> {
    let locked: Vec<usize> = params.snapshot.locked.iter().copied().collect();
    sqlx::query_as::<_, ExamSession>(&format!(
        "INSERT INTO exam_sessions (
            id, exam_id, student_id, status, current_index, selections, locked,
            started_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8,$8)
        ON CONFLICT (exam_id, student_id) WHERE status <> 'submitted' DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.snapshot.status)
    .bind(params.snapshot.current_index as i32)
    .bind(Json(&params.snapshot.selections))
    .bind(Json(locked))
    .bind(params.now)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!("SELECT {COLUMNS} FROM exam_sessions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Row-locks the session for the rest of the transaction.
pub(crate) async fn find_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_open(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions \
         WHERE exam_id = $1 AND student_id = $2 AND status <> $3 \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(SessionStatus::Submitted)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn save_snapshot(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    snapshot: &SessionSnapshot,
    now: PrimitiveDateTime,
) -> Result<ExamSession, sqlx::Error> {
    let locked: Vec<usize> = snapshot.locked.iter().copied().collect();
    let submitted_at = (snapshot.status == SessionStatus::Submitted).then_some(now);
    sqlx::query_as::<_, ExamSession>(&format!(
        "UPDATE exam_sessions SET
            status = $1,
            current_index = $2,
            selections = $3,
            locked = $4,
            submitted_at = COALESCE(submitted_at, $5),
            updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(snapshot.status)
    .bind(snapshot.current_index as i32)
    .bind(Json(&snapshot.selections))
    .bind(Json(locked))
    .bind(submitted_at)
    .bind(now)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) fn snapshot_of(session: &ExamSession) -> SessionSnapshot {
    SessionSnapshot {
        status: session.status,
        current_index: session.current_index.max(0) as usize,
        selections: session.selections.0.clone(),
        locked: session.locked.0.iter().copied().collect::<BTreeSet<usize>>(),
    }
}
