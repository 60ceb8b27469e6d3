#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use practice_backend::config::Config;
use practice_backend::db::config::DbConfig;
use practice_backend::db::DatabaseProxy;

pub struct TestDb {
    _dir: TempDir,
    pub proxy: Arc<DatabaseProxy>,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = DbConfig::at_path(dir.path().join("practice.db"));
        let proxy = DatabaseProxy::connect(config)
            .await
            .expect("failed to open test database");
        Self { _dir: dir, proxy }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.proxy.pool()
    }

    pub fn app(&self) -> Router {
        practice_backend::create_app_with(Some(Arc::clone(&self.proxy)), &Config::default())
    }
}

pub struct ItemSeed<'a> {
    pub id: &'a str,
    pub unit_id: &'a str,
    pub difficulty: &'a str,
    pub answer: &'a str,
    pub is_active: bool,
    pub review_status: &'a str,
    pub is_official: bool,
}

impl<'a> ItemSeed<'a> {
    pub fn new(id: &'a str, unit_id: &'a str) -> Self {
        Self {
            id,
            unit_id,
            difficulty: "medium",
            answer: "a",
            is_active: true,
            review_status: "ok",
            is_official: false,
        }
    }
}

pub async fn seed_topic(pool: &SqlitePool, id: &str, track_id: &str) {
    sqlx::query(r#"INSERT INTO "topics" ("id","trackId","title","updatedAt") VALUES ($1,$2,$3,$4)"#)
        .bind(id)
        .bind(track_id)
        .bind(format!("Topic {id}"))
        .bind(Utc::now().timestamp_millis())
        .execute(pool)
        .await
        .expect("seed topic");
}

pub async fn seed_document(pool: &SqlitePool, id: &str) {
    sqlx::query(r#"INSERT INTO "source_documents" ("id","title") VALUES ($1,$2)"#)
        .bind(id)
        .bind(format!("Document {id}"))
        .execute(pool)
        .await
        .expect("seed document");
}

/// Inserts units `{document_id}-u{n}` for every n in `numbers`.
pub async fn seed_units(pool: &SqlitePool, document_id: &str, numbers: std::ops::RangeInclusive<i64>, essential: bool) {
    for n in numbers {
        sqlx::query(
            r#"INSERT INTO "source_units" ("id","documentId","unitNumber","isEssential") VALUES ($1,$2,$3,$4)"#,
        )
        .bind(unit_id(document_id, n))
        .bind(document_id)
        .bind(n)
        .bind(i64::from(essential))
        .execute(pool)
        .await
        .expect("seed source unit");
    }
}

pub fn unit_id(document_id: &str, n: i64) -> String {
    format!("{document_id}-u{n}")
}

pub async fn seed_scope(pool: &SqlitePool, topic_id: &str, document_id: &str, start: i64, end: i64) {
    sqlx::query(
        r#"
        INSERT INTO "scope_units" ("id","topicId","documentId","rangeStart","rangeEnd","updatedAt")
        VALUES ($1,$2,$3,$4,$5,$6)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(topic_id)
    .bind(document_id)
    .bind(start)
    .bind(end)
    .bind(Utc::now().timestamp_millis())
    .execute(pool)
    .await
    .expect("seed scope unit");
}

pub async fn seed_item(pool: &SqlitePool, item: ItemSeed<'_>) {
    sqlx::query(
        r#"
        INSERT INTO "content_items"
          ("id","sourceUnitId","difficulty","isActive","reviewStatus","isOfficial","correctAnswer","explanation")
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        "#,
    )
    .bind(item.id)
    .bind(item.unit_id)
    .bind(item.difficulty)
    .bind(i64::from(item.is_active))
    .bind(item.review_status)
    .bind(i64::from(item.is_official))
    .bind(item.answer)
    .bind(format!("because {}", item.answer))
    .execute(pool)
    .await
    .expect("seed content item");
}

pub async fn seed_signal(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
    total: i64,
    correct: i64,
    last_attempt_at: DateTime<Utc>,
) {
    sqlx::query(
        r#"
        INSERT INTO "user_item_signals"
          ("userId","itemId","totalAttempts","correctAttempts","lastAttemptAt","createdAt")
        VALUES ($1,$2,$3,$4,$5,$5)
        "#,
    )
    .bind(user_id)
    .bind(item_id)
    .bind(total)
    .bind(correct)
    .bind(last_attempt_at.timestamp_millis())
    .execute(pool)
    .await
    .expect("seed signal");
}

/// One topic `topic-1` on track `track-1` covering `count` units of `doc-1`,
/// one item `Q{n}` per unit, all answered with "a".
pub async fn seed_single_topic(pool: &SqlitePool, count: i64) {
    seed_topic(pool, "topic-1", "track-1").await;
    seed_document(pool, "doc-1").await;
    seed_units(pool, "doc-1", 1..=count, false).await;
    seed_scope(pool, "topic-1", "doc-1", 1, count).await;
    for n in 1..=count {
        let id = format!("Q{n}");
        let unit = unit_id("doc-1", n);
        seed_item(pool, ItemSeed::new(&id, &unit)).await;
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
