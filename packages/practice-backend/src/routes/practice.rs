use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::DatabaseProxy;
use crate::practice::pool::PoolConstraints;
use crate::practice::types::{DifficultyBias, TopicSelector};
use crate::response::{ok, AppError};
use crate::services::practice::{NextDraw, StartSession};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_session))
        .route("/:id", get(get_session).delete(end_session))
        .route("/:id/next", post(next_items))
        .route("/:id/answer", post(submit_answer))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicsField {
    Keyword(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    topics: TopicsField,
    track_id: Option<String>,
    count: i64,
    exclude_recent_days: Option<i64>,
    #[serde(default)]
    weak_area_mode: bool,
    #[serde(default)]
    official_only: bool,
    #[serde(default)]
    essential_only: bool,
    difficulty_bias: Option<String>,
    #[serde(default)]
    adaptive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextItemsRequest {
    count: i64,
    difficulty_bias: Option<String>,
    #[serde(default)]
    already_delivered: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswerRequest {
    item_id: String,
    user_answer: String,
}

async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user_id) = require_user(&state, &headers)?;

    let input = StartSession {
        topics: parse_topics(payload.topics, payload.track_id)?,
        count: parse_count(payload.count)?,
        exclude_recent_days: payload
            .exclude_recent_days
            .map(|days| {
                u32::try_from(days).map_err(|_| {
                    AppError::validation("excludeRecentDays must be a non-negative integer")
                })
            })
            .transpose()?,
        weak_area_mode: payload.weak_area_mode,
        constraints: PoolConstraints {
            official_only: payload.official_only,
            essential_only: payload.essential_only,
            ..PoolConstraints::default()
        },
        difficulty_bias: parse_bias(payload.difficulty_bias.as_deref())?,
        adaptive: payload.adaptive,
    };

    let draw = state
        .practice()
        .start_session(proxy.as_ref(), &user_id, input)
        .await?;

    Ok((StatusCode::CREATED, ok(draw)))
}

async fn next_items(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<NextItemsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user_id) = require_user(&state, &headers)?;

    let input = NextDraw {
        count: parse_count(payload.count)?,
        difficulty_bias: parse_bias(payload.difficulty_bias.as_deref())?,
        already_delivered: payload.already_delivered,
    };

    let draw = state
        .practice()
        .draw_next(proxy.as_ref(), &user_id, &session_id, input)
        .await?;

    Ok(ok(draw))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user_id) = require_user(&state, &headers)?;

    let item_id = payload.item_id.trim();
    if item_id.is_empty() {
        return Err(AppError::validation("itemId is required"));
    }

    let outcome = state
        .practice()
        .submit_answer(
            proxy.as_ref(),
            &user_id,
            &session_id,
            item_id,
            &payload.user_answer,
        )
        .await?;

    Ok(ok(outcome))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user_id) = require_user(&state, &headers)?;
    let snapshot = state
        .practice()
        .get_session(proxy.as_ref(), &user_id, &session_id)
        .await?;
    Ok(ok(snapshot))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, user_id) = require_user(&state, &headers)?;
    let snapshot = state
        .practice()
        .end_session(proxy.as_ref(), &user_id, &session_id)
        .await?;
    Ok(ok(snapshot))
}

/// The gateway authenticates and forwards the user id in `X-User-Id`.
pub(crate) fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<DatabaseProxy>, String), AppError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing X-User-Id header"))?
        .to_string();

    let proxy = state
        .db_proxy()
        .ok_or_else(|| AppError::service_unavailable("database unavailable"))?;

    Ok((proxy, user_id))
}

fn parse_topics(topics: TopicsField, track_id: Option<String>) -> Result<TopicSelector, AppError> {
    let track_id = track_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    match topics {
        TopicsField::Keyword(keyword) if keyword.trim().eq_ignore_ascii_case("all") => {
            Ok(TopicSelector::All { track_id })
        }
        TopicsField::Keyword(topic_id) => {
            let topic_id = topic_id.trim();
            if topic_id.is_empty() {
                return Err(AppError::validation("topics must not be empty"));
            }
            Ok(TopicSelector::One(topic_id.to_string()))
        }
        TopicsField::List(list) => {
            let list: Vec<String> = list
                .into_iter()
                .map(|topic_id| topic_id.trim().to_string())
                .filter(|topic_id| !topic_id.is_empty())
                .collect();
            if list.is_empty() {
                return Err(AppError::validation("topics must not be empty"));
            }
            Ok(TopicSelector::Many(list))
        }
    }
}

fn parse_count(count: i64) -> Result<usize, AppError> {
    if count <= 0 {
        return Err(AppError::validation("count must be a positive integer"));
    }
    usize::try_from(count).map_err(|_| AppError::validation("count is out of range"))
}

/// `none` and an absent field both mean no bias.
fn parse_bias(raw: Option<&str>) -> Result<Option<DifficultyBias>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("none") => Ok(None),
        Some(value) => DifficultyBias::parse(value)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("unknown difficultyBias: {value}"))),
    }
}
