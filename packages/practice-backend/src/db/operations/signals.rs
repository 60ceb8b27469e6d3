use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::practice::types::{ContentItemId, UserItemSignal};

const MAX_BATCH_SIZE: usize = 500;

/// Folds one answer into the user's signal for the item.
///
/// A single `INSERT .. ON CONFLICT DO UPDATE` statement, so concurrent answers
/// for the same pair serialize on SQLite's write lock and neither increment is
/// lost. `lastAttemptAt` never moves backwards.
pub async fn record_answer(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
    was_correct: bool,
    at: DateTime<Utc>,
) -> Result<UserItemSignal, sqlx::Error> {
    let at_ms = at.timestamp_millis();
    let row = sqlx::query(
        r#"
        INSERT INTO "user_item_signals"
          ("userId", "itemId", "totalAttempts", "correctAttempts", "lastAttemptAt", "createdAt")
        VALUES ($1, $2, 1, $3, $4, $4)
        ON CONFLICT ("userId", "itemId") DO UPDATE SET
          "totalAttempts" = "user_item_signals"."totalAttempts" + 1,
          "correctAttempts" = "user_item_signals"."correctAttempts" + EXCLUDED."correctAttempts",
          "lastAttemptAt" = MAX(COALESCE("user_item_signals"."lastAttemptAt", 0), EXCLUDED."lastAttemptAt")
        RETURNING "userId", "itemId", "totalAttempts", "correctAttempts", "lastAttemptAt"
        "#,
    )
    .bind(user_id)
    .bind(item_id)
    .bind(i64::from(was_correct))
    .bind(at_ms)
    .fetch_one(pool)
    .await?;

    map_signal_row(&row)
}

pub async fn select_signal(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
) -> Result<Option<UserItemSignal>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "userId", "itemId", "totalAttempts", "correctAttempts", "lastAttemptAt"
        FROM "user_item_signals"
        WHERE "userId" = $1 AND "itemId" = $2
        "#,
    )
    .bind(user_id)
    .bind(item_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_signal_row).transpose()
}

/// Signals for the given items keyed by item id. Items the user has never
/// answered are simply absent.
pub async fn select_signals(
    pool: &SqlitePool,
    user_id: &str,
    item_ids: &[ContentItemId],
) -> Result<HashMap<ContentItemId, UserItemSignal>, sqlx::Error> {
    let mut out = HashMap::with_capacity(item_ids.len());
    for chunk in item_ids.chunks(MAX_BATCH_SIZE) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT "userId", "itemId", "totalAttempts", "correctAttempts", "lastAttemptAt"
            FROM "user_item_signals"
            WHERE "userId" = "#,
        );
        qb.push_bind(user_id);
        qb.push(r#" AND "itemId" IN ("#);
        {
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(id);
            }
            sep.push_unseparated(")");
        }

        let rows = qb.build().fetch_all(pool).await?;
        for row in &rows {
            let signal = map_signal_row(row)?;
            out.insert(signal.item_id.clone(), signal);
        }
    }
    Ok(out)
}

fn map_signal_row(row: &SqliteRow) -> Result<UserItemSignal, sqlx::Error> {
    let last_attempt_ms: Option<i64> = row.try_get("lastAttemptAt")?;
    Ok(UserItemSignal {
        user_id: row.try_get("userId")?,
        item_id: row.try_get("itemId")?,
        total_attempts: row.try_get("totalAttempts")?,
        correct_attempts: row.try_get("correctAttempts")?,
        last_attempt_at: last_attempt_ms.and_then(DateTime::from_timestamp_millis),
    })
}
