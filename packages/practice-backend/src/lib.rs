pub mod config;
pub mod core;
pub mod db;
pub mod logging;
pub mod practice;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::DatabaseProxy;
use crate::state::AppState;

pub fn create_app_with(db_proxy: Option<Arc<DatabaseProxy>>, config: &Config) -> axum::Router {
    app_router(AppState::new(db_proxy, config.selection.clone()))
}

pub fn app_router(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
