use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::engine::{moderation, store};
use crate::error::EngineError;
use crate::models::{
    BulkModerateRequest, HardDeleteRequest, ModerateRequest, ModerationListQuery, PageRequest,
};
use crate::routes::auth::extract_moderator;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
}

pub fn moderation_routes() -> Router<AppState> {
    Router::new()
        .route("/comments/moderation/", get(list_for_moderation))
        .route("/comments/moderation/bulk/", post(bulk_moderate))
        .route("/comments/moderation/auto/", post(auto_moderate))
        .route("/comments/moderation/stats/", get(moderation_stats))
        .route("/comments/{id}/moderate/", post(moderate_comment))
        .route("/comments/{id}/hard-delete/", delete(hard_delete_comment))
        .route("/comments/{id}/history/", get(moderation_history))
}

async fn list_for_moderation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ModerationListQuery>,
) -> Result<impl IntoResponse, EngineError> {
    extract_moderator(&state, &headers).await?;

    let filter = moderation::ModerationFilter::from_query(&query)?;
    let page = PageRequest::new(query.page, query.page_size);
    let comments = moderation::list_for_moderation(&state.pool, &filter, &state.moderation, page).await?;
    Ok(Json(comments))
}

async fn moderate_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
    Json(input): Json<ModerateRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let moderator = extract_moderator(&state, &headers).await?;
    let comment = moderation::moderate(
        &state.pool,
        comment_id,
        &moderator,
        input.action,
        input.reason.as_deref(),
    )
    .await?;
    Ok(Json(comment))
}

async fn bulk_moderate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<BulkModerateRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let moderator = extract_moderator(&state, &headers).await?;
    let result = moderation::bulk_moderate(
        &state.pool,
        &input.comment_ids,
        &moderator,
        input.action,
        input.reason.as_deref(),
    )
    .await?;
    Ok(Json(result))
}

async fn auto_moderate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let moderator = extract_moderator(&state, &headers).await?;
    let result = moderation::auto_moderate(&state.pool, &state.moderation).await?;
    tracing::info!(
        moderator_id = moderator.id,
        flagged_count = result.flagged_count,
        "Auto-moderation triggered manually"
    );
    Ok(Json(result))
}

async fn hard_delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
    Json(input): Json<HardDeleteRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let moderator = extract_moderator(&state, &headers).await?;
    let purged = store::hard_delete(&state.pool, comment_id, &moderator, &input.reason).await?;
    Ok(Json(serde_json::json!({
        "deleted_ids": purged,
    })))
}

async fn moderation_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, EngineError> {
    extract_moderator(&state, &headers).await?;
    let days = query.days.unwrap_or(moderation::DEFAULT_STATS_WINDOW_DAYS);
    let stats = moderation::stats(&state.pool, days).await?;
    Ok(Json(stats))
}

async fn moderation_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    extract_moderator(&state, &headers).await?;
    let records = moderation::history(&state.pool, comment_id).await?;
    Ok(Json(records))
}
