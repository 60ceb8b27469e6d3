use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::response::{ok, AppError};
use crate::routes::practice::require_user;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/by-item/:item_id", get(topics_by_item))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemTopicsResponse {
    item_id: String,
    topic_ids: Vec<String>,
}

async fn topics_by_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (proxy, _user_id) = require_user(&state, &headers)?;

    let topics = state
        .scope()
        .topics_for_item(proxy.as_ref(), &item_id)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, item_id = %item_id, "topic lookup failed");
            AppError::internal(err.to_string())
        })?
        .ok_or_else(|| AppError::not_found(format!("item not found: {item_id}")))?;

    Ok(ok(ItemTopicsResponse {
        item_id,
        topic_ids: topics.into_iter().collect(),
    }))
}
