use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::practice::types::ContentItemId;

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    /// Serialized start request, replayed for follow-up draws.
    pub request: String,
    pub adaptive: bool,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCounts {
    pub questions_answered: i64,
    pub correct_answers: i64,
}

/// Creates the session together with its first delivered items.
pub async fn insert_session(
    pool: &SqlitePool,
    session: &SessionRow,
    delivered: &[ContentItemId],
) -> Result<(), sqlx::Error> {
    let started_ms = session.started_at.timestamp_millis();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO "practice_sessions"
          ("id", "userId", "request", "adaptive", "questionsAnswered", "correctAnswers", "startedAt")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.request)
    .bind(i64::from(session.adaptive))
    .bind(session.questions_answered)
    .bind(session.correct_answers)
    .bind(started_ms)
    .execute(&mut *tx)
    .await?;

    for (position, item_id) in delivered.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO "practice_session_items" ("sessionId", "itemId", "position", "deliveredAt")
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ("sessionId", "itemId") DO NOTHING
            "#,
        )
        .bind(&session.id)
        .bind(item_id)
        .bind(position as i64)
        .bind(started_ms)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn select_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "userId", "request", "adaptive", "questionsAnswered", "correctAnswers", "startedAt"
        FROM "practice_sessions"
        WHERE "id" = $1
        LIMIT 1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_session_row).transpose()
}

/// Delivered item ids in delivery order.
pub async fn select_delivered_items(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<ContentItemId>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT "itemId" FROM "practice_session_items"
        WHERE "sessionId" = $1
        ORDER BY "position" ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}

pub async fn is_item_delivered(
    pool: &SqlitePool,
    session_id: &str,
    item_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"SELECT 1 FROM "practice_session_items" WHERE "sessionId" = $1 AND "itemId" = $2 LIMIT 1"#,
    )
    .bind(session_id)
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

/// Appends items after the current tail. Items already delivered in the
/// session are skipped.
pub async fn append_delivered_items(
    pool: &SqlitePool,
    session_id: &str,
    items: &[ContentItemId],
    at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let at_ms = at.timestamp_millis();
    let mut inserted = 0;
    let mut tx = pool.begin().await?;

    for item_id in items {
        let result = sqlx::query(
            r#"
            INSERT INTO "practice_session_items" ("sessionId", "itemId", "position", "deliveredAt")
            SELECT $1, $2, COALESCE(MAX("position") + 1, 0), $3
            FROM "practice_session_items"
            WHERE "sessionId" = $1
            ON CONFLICT ("sessionId", "itemId") DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(item_id)
        .bind(at_ms)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Bumps the session counters in place. `None` when the session is gone.
pub async fn increment_session_progress(
    pool: &SqlitePool,
    session_id: &str,
    was_correct: bool,
) -> Result<Option<ProgressCounts>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE "practice_sessions"
        SET "questionsAnswered" = "questionsAnswered" + 1,
            "correctAnswers" = "correctAnswers" + $2
        WHERE "id" = $1
        RETURNING "questionsAnswered", "correctAnswers"
        "#,
    )
    .bind(session_id)
    .bind(i64::from(was_correct))
    .fetch_optional(pool)
    .await?;

    row.map(|row| -> Result<ProgressCounts, sqlx::Error> {
        Ok(ProgressCounts {
            questions_answered: row.try_get("questionsAnswered")?,
            correct_answers: row.try_get("correctAnswers")?,
        })
    })
    .transpose()
}

/// Drops the session and its delivered-item rows. User signals are untouched.
pub async fn delete_session(pool: &SqlitePool, session_id: &str) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(r#"DELETE FROM "practice_session_items" WHERE "sessionId" = $1"#)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query(r#"DELETE FROM "practice_sessions" WHERE "id" = $1"#)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

fn map_session_row(row: &SqliteRow) -> Result<SessionRow, sqlx::Error> {
    let started_ms: i64 = row.try_get("startedAt")?;
    Ok(SessionRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        request: row.try_get("request")?,
        adaptive: row.try_get::<i64, _>("adaptive")? != 0,
        questions_answered: row.try_get("questionsAnswered")?,
        correct_answers: row.try_get("correctAnswers")?,
        started_at: DateTime::from_timestamp_millis(started_ms).unwrap_or_default(),
    })
}
