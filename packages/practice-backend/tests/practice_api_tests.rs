use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use practice_backend::db::operations::select_signal;
use practice_backend::practice::config::SelectionConfig;
use practice_backend::state::AppState;

mod common;

use common::{ids, send, ItemSeed, TestDb};

const SESSIONS: &str = "/api/practice-sessions";

async fn start(db: &TestDb, user: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    send(&db.app(), Method::POST, SESSIONS, Some(user), Some(body)).await
}

#[tokio::test]
async fn test_never_seen_items_come_first() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 5).await;
    let yesterday = Utc::now() - Duration::days(1);
    common::seed_signal(db.pool(), "u1", "Q1", 1, 1, yesterday).await;
    common::seed_signal(db.pool(), "u1", "Q2", 1, 0, yesterday).await;

    let (status, body) = start(&db, "u1", json!({ "topics": ["topic-1"], "count": 3 })).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let mut items = ids(&body["data"]["items"]);
    items.sort();
    assert_eq!(items, vec!["Q3", "Q4", "Q5"]);
    assert_eq!(body["data"]["partial"], false);
    assert_eq!(body["data"]["recencyExclusionViolated"], false);
    assert_eq!(body["data"]["breakdown"]["neverSeen"], 3);
}

#[tokio::test]
async fn test_small_pool_returns_partial_result() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 12).await;

    let (status, body) = start(&db, "u1", json!({ "topics": "all", "count": 50 })).await;

    assert_eq!(status, StatusCode::CREATED);
    let items = ids(&body["data"]["items"]);
    assert_eq!(items.len(), 12);
    assert_eq!(items.iter().collect::<HashSet<_>>().len(), 12);
    assert_eq!(body["data"]["partial"], true);
}

#[tokio::test]
async fn test_follow_up_draws_never_repeat_items() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 10).await;
    let app = db.app();

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": "topic-1", "count": 4 })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let mut seen: HashSet<String> = ids(&body["data"]["items"]).into_iter().collect();

    let next_uri = format!("{SESSIONS}/{session_id}/next");
    let (status, second) =
        send(&app, Method::POST, &next_uri, Some("u1"), Some(json!({ "count": 4 }))).await;
    assert_eq!(status, StatusCode::OK);
    for id in ids(&second["data"]["items"]) {
        assert!(seen.insert(id), "item repeated in session");
    }

    let (_, third) =
        send(&app, Method::POST, &next_uri, Some("u1"), Some(json!({ "count": 4 }))).await;
    let third_items = ids(&third["data"]["items"]);
    assert_eq!(third_items.len(), 2);
    assert_eq!(third["data"]["partial"], true);
    for id in third_items {
        assert!(seen.insert(id), "item repeated in session");
    }
    assert_eq!(seen.len(), 10);

    let (_, snapshot) = send(
        &app,
        Method::GET,
        &format!("{SESSIONS}/{session_id}"),
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(ids(&snapshot["data"]["deliveredItems"]).len(), 10);
}

#[tokio::test]
async fn test_client_exclusions_are_honoured() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 4).await;
    let app = db.app();

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": ["topic-1"], "count": 1 })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let first = ids(&body["data"]["items"]);

    let remaining: Vec<String> = ["Q1", "Q2", "Q3", "Q4"]
        .iter()
        .map(|id| id.to_string())
        .filter(|id| !first.contains(id))
        .collect();
    let excluded = vec![remaining[0].clone(), remaining[1].clone()];

    let (_, next) = send(
        &app,
        Method::POST,
        &format!("{SESSIONS}/{session_id}/next"),
        Some("u1"),
        Some(json!({ "count": 3, "alreadyDelivered": excluded })),
    )
    .await;
    assert_eq!(ids(&next["data"]["items"]), vec![remaining[2].clone()]);
    assert_eq!(next["data"]["partial"], true);
}

#[tokio::test]
async fn test_weak_items_follow_never_seen_in_weak_area_mode() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 3).await;
    let now = Utc::now();
    common::seed_signal(db.pool(), "u1", "Q1", 3, 0, now - Duration::days(1)).await;
    common::seed_signal(db.pool(), "u1", "Q2", 1, 1, now - Duration::days(30)).await;

    let (_, body) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 2, "weakAreaMode": true }),
    )
    .await;

    assert_eq!(ids(&body["data"]["items"]), vec!["Q3", "Q1"]);
    assert_eq!(body["data"]["breakdown"]["weak"], 1);
    assert_eq!(body["data"]["recencyExclusionViolated"], false);
}

#[tokio::test]
async fn test_recency_window_relaxed_least_recent_first() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 3).await;
    let now = Utc::now();
    common::seed_signal(db.pool(), "u1", "Q1", 1, 1, now - Duration::days(1)).await;
    common::seed_signal(db.pool(), "u1", "Q2", 1, 1, now - Duration::days(5)).await;
    common::seed_signal(db.pool(), "u1", "Q3", 1, 1, now - Duration::days(3)).await;

    let (status, body) = start(&db, "u1", json!({ "topics": ["topic-1"], "count": 2 })).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ids(&body["data"]["items"]), vec!["Q2", "Q3"]);
    assert_eq!(body["data"]["recencyExclusionViolated"], true);
    assert_eq!(body["data"]["partial"], false);
}

#[tokio::test]
async fn test_zero_day_window_disables_recency_exclusion() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 2).await;
    let now = Utc::now();
    common::seed_signal(db.pool(), "u1", "Q1", 1, 1, now - Duration::hours(1)).await;
    common::seed_signal(db.pool(), "u1", "Q2", 1, 1, now - Duration::hours(2)).await;

    let (_, body) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 2, "excludeRecentDays": 0 }),
    )
    .await;

    assert_eq!(ids(&body["data"]["items"]), vec!["Q2", "Q1"]);
    assert_eq!(body["data"]["recencyExclusionViolated"], false);
    assert_eq!(body["data"]["breakdown"]["eligibleSeen"], 2);
}

#[tokio::test]
async fn test_recency_window_is_bounded() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 2).await;
    common::seed_signal(db.pool(), "u1", "Q1", 1, 1, Utc::now() - Duration::days(2000)).await;

    let (status, body) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 2, "excludeRecentDays": 4_000_000_000u64 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 2, "excludeRecentDays": 3650 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ids(&body["data"]["items"]), vec!["Q2", "Q1"]);
    assert_eq!(body["data"]["recencyExclusionViolated"], true);

    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let (status, _) = send(
        &db.app(),
        Method::POST,
        &format!("{SESSIONS}/{session_id}/next"),
        Some("u1"),
        Some(json!({ "count": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_empty_scope_is_no_eligible_content() {
    let db = TestDb::new().await;
    common::seed_topic(db.pool(), "topic-empty", "track-1").await;

    let (status, body) = start(&db, "u1", json!({ "topics": ["topic-empty"], "count": 5 })).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NO_ELIGIBLE_CONTENT");
}

#[tokio::test]
async fn test_constraints_filter_pool() {
    let db = TestDb::new().await;
    common::seed_topic(db.pool(), "topic-1", "track-1").await;
    common::seed_document(db.pool(), "doc-1").await;
    common::seed_units(db.pool(), "doc-1", 1..=2, false).await;
    common::seed_units(db.pool(), "doc-1", 3..=4, true).await;
    common::seed_scope(db.pool(), "topic-1", "doc-1", 1, 4).await;

    let u = |n| common::unit_id("doc-1", n);
    common::seed_item(db.pool(), ItemSeed { is_official: true, ..ItemSeed::new("official", &u(1)) }).await;
    common::seed_item(db.pool(), ItemSeed { review_status: "flagged", is_official: true, ..ItemSeed::new("flagged", &u(2)) }).await;
    common::seed_item(db.pool(), ItemSeed { is_active: false, ..ItemSeed::new("retired", &u(3)) }).await;
    common::seed_item(db.pool(), ItemSeed { review_status: "unverified", ..ItemSeed::new("essential", &u(4)) }).await;

    let (_, body) = start(&db, "u1", json!({ "topics": "all", "count": 10 })).await;
    let mut items = ids(&body["data"]["items"]);
    items.sort();
    assert_eq!(items, vec!["essential", "official"]);

    let (_, body) = start(
        &db,
        "u1",
        json!({ "topics": "all", "trackId": "track-1", "count": 10, "officialOnly": true }),
    )
    .await;
    assert_eq!(ids(&body["data"]["items"]), vec!["official"]);

    let (_, body) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 10, "essentialOnly": true }),
    )
    .await;
    assert_eq!(ids(&body["data"]["items"]), vec!["essential"]);

    let (status, body) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 10, "officialOnly": true, "essentialOnly": true }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "NO_ELIGIBLE_CONTENT");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 3).await;

    let (status, _) = start(&db, "u1", json!({ "topics": ["topic-1"], "count": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = start(
        &db,
        "u1",
        json!({ "topics": ["topic-1"], "count": 2, "difficultyBias": "sideways" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = start(&db, "u1", json!({ "topics": [], "count": 2 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &db.app(),
        Method::POST,
        SESSIONS,
        None,
        Some(json!({ "topics": ["topic-1"], "count": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_answer_updates_signal_and_progress() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 3).await;
    let app = db.app();

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": ["topic-1"], "count": 2 })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let items = ids(&body["data"]["items"]);
    let answer_uri = format!("{SESSIONS}/{session_id}/answer");

    let (status, first) = send(
        &app,
        Method::POST,
        &answer_uri,
        Some("u1"),
        Some(json!({ "itemId": items[0], "userAnswer": " A " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["isCorrect"], true);
    assert_eq!(first["data"]["correctAnswer"], "a");
    assert_eq!(first["data"]["explanation"], "because a");
    assert_eq!(first["data"]["saved"], true);
    assert_eq!(first["data"]["sessionProgress"]["questionsAnswered"], 1);
    assert_eq!(first["data"]["sessionProgress"]["accuracyPercentage"], 100.0);

    let (_, second) = send(
        &app,
        Method::POST,
        &answer_uri,
        Some("u1"),
        Some(json!({ "itemId": items[1], "userAnswer": "b" })),
    )
    .await;
    assert_eq!(second["data"]["isCorrect"], false);
    assert_eq!(second["data"]["sessionProgress"]["correctAnswers"], 1);
    assert_eq!(second["data"]["sessionProgress"]["accuracyPercentage"], 50.0);

    let signal = select_signal(db.pool(), "u1", &items[1]).await.unwrap().unwrap();
    assert_eq!(signal.total_attempts, 1);
    assert_eq!(signal.correct_attempts, 0);
    assert!(signal.last_attempt_at.is_some());
}

#[tokio::test]
async fn test_answer_verdict_survives_failed_signal_write() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 1).await;
    let state = AppState::new(Some(Arc::clone(&db.proxy)), SelectionConfig::default());
    let mut events = state.events().subscribe();
    let app = practice_backend::app_router(state);

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": ["topic-1"], "count": 1 })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();

    sqlx::query(
        r#"CREATE TRIGGER "reject_signal_writes" BEFORE INSERT ON "user_item_signals"
        BEGIN SELECT RAISE(ABORT, 'signal store offline'); END"#,
    )
    .execute(db.pool())
    .await
    .unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{SESSIONS}/{session_id}/answer"),
        Some("u1"),
        Some(json!({ "itemId": "Q1", "userAnswer": "a" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isCorrect"], true);
    assert_eq!(body["data"]["correctAnswer"], "a");
    assert_eq!(body["data"]["saved"], false);
    assert_eq!(body["data"]["sessionProgress"]["questionsAnswered"], 1);
    assert!(select_signal(db.pool(), "u1", "Q1").await.unwrap().is_none());

    let mut published = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        published.push(envelope.event.event_type());
    }
    assert!(published.contains(&"SIGNAL_PERSISTENCE_FAILED"));
    assert!(!published.contains(&"ANSWER_RECORDED"));
}

#[tokio::test]
async fn test_answer_requires_delivered_item_and_owner() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 3).await;
    let app = db.app();

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": ["topic-1"], "count": 1 })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let delivered = ids(&body["data"]["items"]);
    let undelivered = ["Q1", "Q2", "Q3"]
        .into_iter()
        .find(|id| !delivered.iter().any(|d| d == id))
        .unwrap();
    let answer_uri = format!("{SESSIONS}/{session_id}/answer");

    let (status, body) = send(
        &app,
        Method::POST,
        &answer_uri,
        Some("u1"),
        Some(json!({ "itemId": undelivered, "userAnswer": "a" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ITEM_NOT_IN_SESSION");

    let (status, _) = send(
        &app,
        Method::POST,
        &answer_uri,
        Some("u2"),
        Some(json!({ "itemId": delivered[0], "userAnswer": "a" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("{SESSIONS}/missing/answer"),
        Some("u1"),
        Some(json!({ "itemId": delivered[0], "userAnswer": "a" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_adaptive_session_biases_next_draw() {
    let db = TestDb::new().await;
    common::seed_topic(db.pool(), "topic-1", "track-1").await;
    common::seed_document(db.pool(), "doc-1").await;
    common::seed_units(db.pool(), "doc-1", 1..=6, false).await;
    common::seed_scope(db.pool(), "topic-1", "doc-1", 1, 6).await;
    let u = |n| common::unit_id("doc-1", n);
    for (id, n, difficulty) in [
        ("M1", 1, "medium"),
        ("M2", 2, "medium"),
        ("M3", 3, "medium"),
        ("E1", 4, "easy"),
        ("E2", 5, "easy"),
        ("H1", 6, "hard"),
    ] {
        common::seed_item(db.pool(), ItemSeed { difficulty, ..ItemSeed::new(id, &u(n)) }).await;
    }
    let app = db.app();

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": ["topic-1"], "count": 3, "adaptive": true, "difficultyBias": "easier" })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let first = ids(&body["data"]["items"]);
    assert!(!first.contains(&"H1".to_string()));

    for item in &first {
        send(
            &app,
            Method::POST,
            &format!("{SESSIONS}/{session_id}/answer"),
            Some("u1"),
            Some(json!({ "itemId": item, "userAnswer": "a" })),
        )
        .await;
    }

    let (_, next) = send(
        &app,
        Method::POST,
        &format!("{SESSIONS}/{session_id}/next"),
        Some("u1"),
        Some(json!({ "count": 1 })),
    )
    .await;
    assert_eq!(next["data"]["difficultyBias"], "harder");
    let drawn = ids(&next["data"]["items"]);
    assert_eq!(drawn.len(), 1);
    assert_ne!(drawn[0].chars().next(), Some('E'));

    let (_, snapshot) = send(
        &app,
        Method::GET,
        &format!("{SESSIONS}/{session_id}"),
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(snapshot["data"]["progress"]["accuracyPercentage"], 100.0);
    assert_eq!(snapshot["data"]["suggestedBias"], "harder");
}

#[tokio::test]
async fn test_end_session_discards_session_but_keeps_signals() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 2).await;
    let app = db.app();

    let (_, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": ["topic-1"], "count": 1 })),
    )
    .await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    let item = ids(&body["data"]["items"]).remove(0);
    send(
        &app,
        Method::POST,
        &format!("{SESSIONS}/{session_id}/answer"),
        Some("u1"),
        Some(json!({ "itemId": item, "userAnswer": "a" })),
    )
    .await;

    let session_uri = format!("{SESSIONS}/{session_id}");
    let (status, ended) = send(&app, Method::DELETE, &session_uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["data"]["progress"]["questionsAnswered"], 1);

    let (status, _) = send(&app, Method::GET, &session_uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let signal = select_signal(db.pool(), "u1", &item).await.unwrap().unwrap();
    assert_eq!(signal.total_attempts, 1);
}

#[tokio::test]
async fn test_topics_by_item() {
    let db = TestDb::new().await;
    common::seed_single_topic(db.pool(), 3).await;
    common::seed_topic(db.pool(), "topic-2", "track-2").await;
    common::seed_scope(db.pool(), "topic-2", "doc-1", 3, 3).await;
    let app = db.app();

    let (status, body) = send(&app, Method::GET, "/api/topics/by-item/Q3", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["topicIds"], json!(["topic-1", "topic-2"]));

    let (status, _) = send(&app, Method::GET, "/api/topics/by-item/nope", Some("u1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let db = TestDb::new().await;
    let app = db.app();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");

    let (status, _) = send(&app, Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_degraded_without_database() {
    let app = practice_backend::create_app_with(None, &practice_backend::config::Config::default());

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    let (status, body) = send(
        &app,
        Method::POST,
        SESSIONS,
        Some("u1"),
        Some(json!({ "topics": "all", "count": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}
