//! Interaction Ledger: one like/dislike row per (actor, comment).
//!
//! This is the only writer of `like_count` / `dislike_count`.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db;
use crate::engine::notify;
use crate::engine::store::require_comment;
use crate::error::EngineError;
use crate::models::{
    Actor, CommentStatus, CountDelta, InteractionKind, InteractionOutcome, InteractionState,
};

/// Pure toggle rule. Setting one kind clears the other; requesting a kind
/// that is already set clears it.
pub fn toggle_state(prev: InteractionState, kind: InteractionKind) -> (InteractionState, CountDelta) {
    let next = match kind {
        InteractionKind::Like if prev.liked => InteractionState {
            liked: false,
            disliked: prev.disliked,
        },
        InteractionKind::Like => InteractionState {
            liked: true,
            disliked: false,
        },
        InteractionKind::Dislike if prev.disliked => InteractionState {
            liked: prev.liked,
            disliked: false,
        },
        InteractionKind::Dislike => InteractionState {
            liked: false,
            disliked: true,
        },
    };

    let delta = CountDelta {
        likes: i64::from(next.liked) - i64::from(prev.liked),
        dislikes: i64::from(next.disliked) - i64::from(prev.disliked),
    };
    (next, delta)
}

pub async fn interaction_state(
    pool: &SqlitePool,
    actor_id: i64,
    comment_id: i64,
) -> Result<InteractionState, EngineError> {
    let mut conn = pool.acquire().await?;
    load_state(&mut conn, actor_id, comment_id).await
}

async fn load_state(
    conn: &mut SqliteConnection,
    actor_id: i64,
    comment_id: i64,
) -> Result<InteractionState, EngineError> {
    let row: Option<(bool, bool)> = sqlx::query_as(
        "SELECT liked, disliked FROM comment_interactions WHERE actor_id = ? AND comment_id = ?",
    )
    .bind(actor_id)
    .bind(comment_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row
        .map(|(liked, disliked)| InteractionState { liked, disliked })
        .unwrap_or_default())
}

pub async fn toggle(
    pool: &SqlitePool,
    actor: &Actor,
    comment_id: i64,
    kind: InteractionKind,
) -> Result<InteractionOutcome, EngineError> {
    let mut tx = db::begin_write(pool).await?;

    let comment = require_comment(&mut *tx, comment_id).await?;
    if comment.status != CommentStatus::Published {
        return Err(EngineError::NotFound("Comment not found".to_string()));
    }

    let prev = load_state(&mut tx, actor.id, comment_id).await?;
    let (next, delta) = toggle_state(prev, kind);

    sqlx::query(
        r#"
        INSERT INTO comment_interactions (actor_id, comment_id, liked, disliked, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(actor_id, comment_id) DO UPDATE SET
            liked = excluded.liked,
            disliked = excluded.disliked,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(actor.id)
    .bind(comment_id)
    .bind(next.liked)
    .bind(next.disliked)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE comments
        SET like_count = MAX(like_count + ?, 0),
            dislike_count = MAX(dislike_count + ?, 0)
        WHERE id = ?
        "#,
    )
    .bind(delta.likes)
    .bind(delta.dislikes)
    .bind(comment_id)
    .execute(&mut *tx)
    .await?;

    let outcome = load_outcome(&mut tx, actor.id, comment_id, next).await?;
    tx.commit().await?;

    tracing::debug!(
        comment_id,
        actor_id = actor.id,
        ?kind,
        liked = next.liked,
        disliked = next.disliked,
        "Interaction toggled"
    );

    if next.liked && !prev.liked {
        notify::notify_like(pool, comment.author.id, actor.id, comment_id).await;
    }

    Ok(outcome)
}

/// Files a report. Each actor counts once per comment; repeats are accepted
/// but leave `report_count` unchanged.
pub async fn report(
    pool: &SqlitePool,
    actor: &Actor,
    comment_id: i64,
    reason: Option<&str>,
) -> Result<InteractionOutcome, EngineError> {
    let mut tx = db::begin_write(pool).await?;

    let comment = require_comment(&mut *tx, comment_id).await?;
    if comment.status != CommentStatus::Published {
        return Err(EngineError::NotFound("Comment not found".to_string()));
    }

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO comment_reports (comment_id, reporter_id, reason, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(comment_id)
    .bind(actor.id)
    .bind(reason)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted > 0 {
        sqlx::query("UPDATE comments SET report_count = report_count + 1 WHERE id = ?")
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;
        tracing::info!(comment_id, reporter_id = actor.id, "Comment reported");
    }

    let state = load_state(&mut tx, actor.id, comment_id).await?;
    let outcome = load_outcome(&mut tx, actor.id, comment_id, state).await?;
    tx.commit().await?;

    Ok(outcome)
}

async fn load_outcome(
    conn: &mut SqliteConnection,
    actor_id: i64,
    comment_id: i64,
    state: InteractionState,
) -> Result<InteractionOutcome, EngineError> {
    let (like_count, dislike_count, report_count): (i64, i64, i64) = sqlx::query_as(
        "SELECT like_count, dislike_count, report_count FROM comments WHERE id = ?",
    )
    .bind(comment_id)
    .fetch_one(&mut *conn)
    .await?;

    let (reported,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM comment_reports WHERE comment_id = ? AND reporter_id = ?)",
    )
    .bind(comment_id)
    .bind(actor_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(InteractionOutcome {
        comment_id,
        liked: state.liked,
        disliked: state.disliked,
        like_count,
        dislike_count,
        report_count,
        reported,
    })
}
