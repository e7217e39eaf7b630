#![allow(dead_code)]

use axum::Router;
use chrono::Duration;
use comment_engine::{
    AppState, build_router,
    config::{AppConfig, ModerationSettings},
    db,
    models::Actor,
    routes::auth::issue_token,
};

pub const SECRET: &str = "integration-secret";

pub fn config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        jwt_secret: SECRET.to_string(),
        require_approval: false,
        moderation: ModerationSettings::default(),
        auto_moderation_interval: None,
    }
}

pub async fn app() -> Router {
    app_with(config()).await
}

pub async fn app_with(config: AppConfig) -> Router {
    let pool = db::init_db(&config.database_url).await.unwrap();
    build_router(AppState::new(pool, &config))
}

pub fn member(id: i64) -> Actor {
    Actor {
        id,
        display_name: format!("member-{}", id),
        avatar_url: None,
        is_admin: false,
        is_moderator: false,
    }
}

pub fn moderator(id: i64) -> Actor {
    Actor {
        is_moderator: true,
        ..member(id)
    }
}

pub fn token_for(actor: &Actor) -> String {
    issue_token(SECRET, actor, Duration::hours(1)).unwrap()
}
