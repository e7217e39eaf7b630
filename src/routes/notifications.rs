use axum::{
    Router,
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};

use crate::AppState;
use crate::engine::notify;
use crate::error::EngineError;
use crate::routes::auth::extract_current_actor;

pub fn notifications_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications/", get(list_notifications))
        .route("/notifications/read-all/", post(mark_all_read))
        .route("/notifications/{id}/read/", post(mark_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;
    let inbox = notify::list(&state.pool, actor.id).await?;
    Ok(Json(inbox))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;
    notify::mark_read(&state.pool, notification_id, actor.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;
    let updated = notify::mark_all_read(&state.pool, actor.id).await?;
    Ok(Json(serde_json::json!({"updated": updated})))
}
