pub mod client;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::{Router, extract::FromRef, response::IntoResponse, routing::get};
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::{AppConfig, ModerationSettings};
use routes::{comments_routes, moderation_routes, notifications_routes};

pub use error::EngineError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt_secret: Arc<str>,
    pub require_approval: bool,
    pub moderation: ModerationSettings,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        Self {
            pool,
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            require_approval: config.require_approval,
            moderation: config.moderation,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Full HTTP surface, mounted under `/api`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .merge(moderation_routes())
        .merge(comments_routes())
        .merge(notifications_routes())
        .route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "healthy"}))
}
