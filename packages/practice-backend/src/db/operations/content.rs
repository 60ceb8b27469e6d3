use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::practice::scope::{ScopeUnitRow, SourceUnitRow, TopicRow};
use crate::practice::types::{ContentItem, Difficulty, ReviewStatus};

const MAX_BATCH_SIZE: usize = 500;

/// Cheap summary of the curriculum tables. Counts catch inserts and deletes,
/// and the rowid-weighted checksums catch in-place edits of the columns the
/// scope index is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeFingerprint {
    pub topics: i64,
    pub scope_units: i64,
    pub source_units: i64,
    pub documents: i64,
    pub updated_at: i64,
    pub topic_checksum: i64,
    pub scope_checksum: i64,
    pub unit_checksum: i64,
}

#[derive(Debug, Clone)]
pub struct AnswerKey {
    pub item_id: String,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

pub async fn select_scope_fingerprint(pool: &SqlitePool) -> Result<ScopeFingerprint, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
          (SELECT COUNT(*) FROM "topics") AS "topics",
          (SELECT COUNT(*) FROM "scope_units") AS "scopeUnits",
          (SELECT COUNT(*) FROM "source_units") AS "sourceUnits",
          (SELECT COUNT(*) FROM "source_documents") AS "documents",
          MAX(
            (SELECT COALESCE(MAX("updatedAt"), 0) FROM "topics"),
            (SELECT COALESCE(MAX("updatedAt"), 0) FROM "scope_units")
          ) AS "updatedAt",
          (SELECT COALESCE(SUM(t.rowid * (LENGTH(t."trackId") + COALESCE(UNICODE(t."trackId"), 0))), 0)
             FROM "topics" t) AS "topicChecksum",
          (SELECT COALESCE(SUM(s.rowid * (s."rangeStart" + 3 * s."rangeEnd"
                    + 5 * COALESCE(t.rowid, 0) + 7 * COALESCE(d.rowid, 0))), 0)
             FROM "scope_units" s
             LEFT JOIN "topics" t ON t."id" = s."topicId"
             LEFT JOIN "source_documents" d ON d."id" = s."documentId") AS "scopeChecksum",
          (SELECT COALESCE(SUM(u.rowid * (u."unitNumber" + 3 * COALESCE(d.rowid, 0))), 0)
             FROM "source_units" u
             LEFT JOIN "source_documents" d ON d."id" = u."documentId") AS "unitChecksum"
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ScopeFingerprint {
        topics: row.try_get("topics")?,
        scope_units: row.try_get("scopeUnits")?,
        source_units: row.try_get("sourceUnits")?,
        documents: row.try_get("documents")?,
        updated_at: row.try_get("updatedAt")?,
        topic_checksum: row.try_get("topicChecksum")?,
        scope_checksum: row.try_get("scopeChecksum")?,
        unit_checksum: row.try_get("unitChecksum")?,
    })
}

pub async fn select_topics(pool: &SqlitePool) -> Result<Vec<TopicRow>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT "id","trackId" FROM "topics""#)
        .fetch_all(pool)
        .await?;
    rows.iter().map(map_topic_row).collect()
}

pub async fn select_scope_units(pool: &SqlitePool) -> Result<Vec<ScopeUnitRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT "topicId","documentId","rangeStart","rangeEnd" FROM "scope_units""#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_scope_unit_row).collect()
}

/// Units whose document is missing are left out, so scope units pointing at
/// them resolve to nothing.
pub async fn select_source_units(pool: &SqlitePool) -> Result<Vec<SourceUnitRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT su."id", su."documentId", su."unitNumber"
        FROM "source_units" su
        INNER JOIN "source_documents" d ON d."id" = su."documentId"
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_source_unit_row).collect()
}

pub async fn select_items_by_source_units(
    pool: &SqlitePool,
    source_unit_ids: &[String],
) -> Result<Vec<ContentItem>, sqlx::Error> {
    let mut items = Vec::new();
    for chunk in source_unit_ids.chunks(MAX_BATCH_SIZE) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT ci."id", ci."sourceUnitId", ci."difficulty", ci."isActive",
                   ci."reviewStatus", ci."isOfficial", su."isEssential"
            FROM "content_items" ci
            INNER JOIN "source_units" su ON su."id" = ci."sourceUnitId"
            WHERE ci."sourceUnitId" IN (
            "#,
        );
        {
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(id);
            }
            sep.push_unseparated(")");
        }
        let rows = qb.build().fetch_all(pool).await?;
        for row in &rows {
            items.push(map_item_row(row)?);
        }
    }
    Ok(items)
}

pub async fn select_item(
    pool: &SqlitePool,
    item_id: &str,
) -> Result<Option<ContentItem>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT ci."id", ci."sourceUnitId", ci."difficulty", ci."isActive",
               ci."reviewStatus", ci."isOfficial", COALESCE(su."isEssential", 0) AS "isEssential"
        FROM "content_items" ci
        LEFT JOIN "source_units" su ON su."id" = ci."sourceUnitId"
        WHERE ci."id" = $1
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(map_item_row).transpose()
}

pub async fn select_answer_key(
    pool: &SqlitePool,
    item_id: &str,
) -> Result<Option<AnswerKey>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT "id","correctAnswer","explanation" FROM "content_items" WHERE "id" = $1 LIMIT 1"#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_answer_key_row).transpose()
}

fn map_topic_row(row: &SqliteRow) -> Result<TopicRow, sqlx::Error> {
    Ok(TopicRow {
        id: row.try_get("id")?,
        track_id: row.try_get("trackId")?,
    })
}

fn map_scope_unit_row(row: &SqliteRow) -> Result<ScopeUnitRow, sqlx::Error> {
    Ok(ScopeUnitRow {
        topic_id: row.try_get("topicId")?,
        document_id: row.try_get("documentId")?,
        range_start: row.try_get("rangeStart")?,
        range_end: row.try_get("rangeEnd")?,
    })
}

fn map_source_unit_row(row: &SqliteRow) -> Result<SourceUnitRow, sqlx::Error> {
    Ok(SourceUnitRow {
        id: row.try_get("id")?,
        document_id: row.try_get("documentId")?,
        unit_number: row.try_get("unitNumber")?,
    })
}

fn map_answer_key_row(row: &SqliteRow) -> Result<AnswerKey, sqlx::Error> {
    Ok(AnswerKey {
        item_id: row.try_get("id")?,
        correct_answer: row.try_get("correctAnswer")?,
        explanation: row.try_get("explanation")?,
    })
}

fn map_item_row(row: &SqliteRow) -> Result<ContentItem, sqlx::Error> {
    let difficulty: String = row.try_get("difficulty")?;
    let review_status: String = row.try_get("reviewStatus")?;
    Ok(ContentItem {
        id: row.try_get("id")?,
        source_unit_id: row.try_get("sourceUnitId")?,
        difficulty: Difficulty::parse(&difficulty).unwrap_or(Difficulty::Medium),
        is_active: row.try_get::<i64, _>("isActive")? != 0,
        review_status: ReviewStatus::parse(&review_status).unwrap_or(ReviewStatus::Unverified),
        is_official: row.try_get::<i64, _>("isOfficial")? != 0,
        is_essential: row.try_get::<i64, _>("isEssential")? != 0,
    })
}
