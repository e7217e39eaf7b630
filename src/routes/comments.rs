use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};

use crate::AppState;
use crate::engine::{ledger, resolve, store};
use crate::error::EngineError;
use crate::models::{
    CommentListQuery, CommentOrdering, CommentStatus, CreateComment, InteractRequest,
    InteractionKind, InteractionType, PageRequest, UpdateComment,
};
use crate::routes::auth::{extract_current_actor, extract_optional_actor};

pub fn comments_routes() -> Router<AppState> {
    Router::new()
        .route("/comments/", get(list_comments).post(create_comment))
        .route(
            "/comments/{id}/",
            get(get_comment).patch(update_comment).delete(delete_comment),
        )
        .route("/comments/{id}/replies/", get(list_replies))
        .route("/comments/{id}/interact/", post(interact))
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CommentListQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let (Some(content_type), Some(object_id)) = (&query.content_type, &query.object_id) else {
        return Err(EngineError::InvalidTarget(
            "content_type and object_id are required".to_string(),
        ));
    };
    let target = resolve(content_type, object_id)?;
    let ordering = match query.ordering.as_deref() {
        Some(raw) => CommentOrdering::parse(raw)?,
        None => CommentOrdering::default(),
    };
    let page = PageRequest::new(query.page, query.page_size);

    let viewer = extract_optional_actor(&state, &headers).await?;
    let comments = store::list_comments(&state.pool, &target, page, ordering, viewer.as_ref()).await?;
    Ok(Json(comments))
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateComment>,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;
    let target = resolve(&input.content_type_name, &input.object_id.0)?;

    let initial_status = if state.require_approval && !actor.can_moderate() {
        CommentStatus::Pending
    } else {
        CommentStatus::Published
    };

    let comment = store::create_comment(
        &state.pool,
        &target,
        &actor,
        &input.text,
        input.parent,
        initial_status,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let viewer = extract_optional_actor(&state, &headers).await?;
    let comment = store::get_comment(&state.pool, comment_id, viewer.as_ref()).await?;
    Ok(Json(comment))
}

async fn update_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
    Json(input): Json<UpdateComment>,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;
    let comment = store::update_comment(&state.pool, comment_id, &actor, &input.text).await?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;
    store::soft_delete(&state.pool, comment_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_replies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let viewer = extract_optional_actor(&state, &headers).await?;
    let root = store::get_comment(&state.pool, comment_id, viewer.as_ref()).await?;
    if root.is_reply() {
        return Err(EngineError::InvalidParent(format!(
            "comment {} is a reply, not a root",
            comment_id
        )));
    }

    let replies = store::list_replies(&state.pool, root.id, viewer.as_ref()).await?;
    Ok(Json(replies))
}

async fn interact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(comment_id): Path<i64>,
    Json(input): Json<InteractRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let actor = extract_current_actor(&state, &headers).await?;

    let outcome = match input.interaction_type {
        InteractionType::Like => {
            ledger::toggle(&state.pool, &actor, comment_id, InteractionKind::Like).await?
        }
        InteractionType::Dislike => {
            ledger::toggle(&state.pool, &actor, comment_id, InteractionKind::Dislike).await?
        }
        InteractionType::Report => {
            ledger::report(&state.pool, &actor, comment_id, input.reason.as_deref()).await?
        }
    };

    Ok(Json(outcome))
}
