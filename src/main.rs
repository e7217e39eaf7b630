use std::time::Duration;

use sqlx::SqlitePool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_engine::{
    AppState, build_router,
    config::{AppConfig, ModerationSettings},
    db,
    engine::moderation,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comment_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = db::init_db(&config.database_url).await?;
    tracing::info!("Database initialized");

    if let Some(interval) = config.auto_moderation_interval {
        tokio::spawn(run_auto_moderation(pool.clone(), config.moderation, interval));
        tracing::info!(interval_secs = interval.as_secs(), "Periodic auto-moderation enabled");
    }

    let app = build_router(AppState::new(pool, &config));

    tracing::info!("Server running on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_auto_moderation(pool: SqlitePool, settings: ModerationSettings, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; skip it so start-up stays quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(error) = moderation::auto_moderate(&pool, &settings).await {
            tracing::warn!("Periodic auto-moderation failed: {}", error);
        }
    }
}
