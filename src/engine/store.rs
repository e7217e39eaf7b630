//! Comment Store: CRUD, ordering and pagination over comment rows.

use chrono::Utc;
use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor, SqlitePool};

use crate::db;
use crate::engine::moderation::append_record;
use crate::engine::notify;
use crate::engine::target::TargetHandle;
use crate::error::EngineError;
use crate::models::{
    Actor, Comment, CommentOrdering, CommentRow, CommentStatus, InteractionState,
    ModerationAction, Page, PageRequest,
};

pub(crate) const COMMENT_SELECT: &str = r#"
    SELECT
        c.id,
        c.content_type,
        c.object_id,
        c.author_id,
        c.parent_id,
        c.text,
        c.status,
        c.is_flagged,
        c.like_count,
        c.dislike_count,
        c.reply_count,
        c.report_count,
        c.is_edited,
        c.edited_at,
        c.created_at,
        c.updated_at,
        a.display_name AS author_display_name,
        a.avatar_url AS author_avatar_url,
        a.is_admin AS author_is_admin
    FROM comments c
    JOIN actors a ON a.id = c.author_id
"#;

/// Records the latest identity snapshot for an actor so comment rows can join
/// against it.
pub async fn upsert_actor<'e, E>(executor: E, actor: &Actor) -> Result<(), EngineError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO actors (id, display_name, avatar_url, is_admin, is_moderator, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            avatar_url = excluded.avatar_url,
            is_admin = excluded.is_admin,
            is_moderator = excluded.is_moderator,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(actor.id)
    .bind(&actor.display_name)
    .bind(&actor.avatar_url)
    .bind(actor.is_admin)
    .bind(actor.is_moderator)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_comment<'e, E>(
    executor: E,
    comment_id: i64,
) -> Result<Option<Comment>, EngineError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, CommentRow>(&format!("{} WHERE c.id = ?", COMMENT_SELECT))
        .bind(comment_id)
        .fetch_optional(executor)
        .await?;

    row.map(Comment::try_from).transpose()
}

pub(crate) async fn require_comment<'e, E>(executor: E, comment_id: i64) -> Result<Comment, EngineError>
where
    E: SqliteExecutor<'e>,
{
    fetch_comment(executor, comment_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("Comment not found".to_string()))
}

/// Fills `viewer_interaction` on every comment from the viewer's own ledger
/// rows. Comments the viewer never touched get the empty state.
pub(crate) async fn attach_viewer_state(
    pool: &SqlitePool,
    viewer_id: i64,
    comments: &mut [Comment],
) -> Result<(), EngineError> {
    if comments.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT comment_id, liked, disliked FROM comment_interactions WHERE actor_id = ",
    );
    builder.push_bind(viewer_id).push(" AND comment_id IN (");
    let mut ids = builder.separated(", ");
    for comment in comments.iter() {
        ids.push_bind(comment.id);
    }
    ids.push_unseparated(")");

    let rows: Vec<(i64, bool, bool)> = builder.build_query_as().fetch_all(pool).await?;
    let states: HashMap<i64, InteractionState> = rows
        .into_iter()
        .map(|(comment_id, liked, disliked)| (comment_id, InteractionState { liked, disliked }))
        .collect();

    for comment in comments.iter_mut() {
        comment.viewer_interaction = Some(states.get(&comment.id).copied().unwrap_or_default());
    }
    Ok(())
}

/// Published comments (roots and replies) for a target, one page at a time.
pub async fn list_comments(
    pool: &SqlitePool,
    target: &TargetHandle,
    page: PageRequest,
    ordering: CommentOrdering,
    viewer: Option<&Actor>,
) -> Result<Page<Comment>, EngineError> {
    let rows = sqlx::query_as::<_, CommentRow>(&format!(
        "{} WHERE c.content_type = ? AND c.object_id = ? AND c.status = 'published' ORDER BY {} LIMIT ? OFFSET ?",
        COMMENT_SELECT,
        ordering.order_by_clause()
    ))
    .bind(target.content_type().as_str())
    .bind(target.object_id())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM comments WHERE content_type = ? AND object_id = ? AND status = 'published'",
    )
    .bind(target.content_type().as_str())
    .bind(target.object_id())
    .fetch_one(pool)
    .await?;

    let mut results = rows
        .into_iter()
        .map(Comment::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(viewer) = viewer {
        attach_viewer_state(pool, viewer.id, &mut results).await?;
    }

    Ok(Page::new(results, count, page))
}

/// Published replies of one root, oldest first.
pub async fn list_replies(
    pool: &SqlitePool,
    root_id: i64,
    viewer: Option<&Actor>,
) -> Result<Vec<Comment>, EngineError> {
    let root = require_comment(pool, root_id).await?;
    if root.status != CommentStatus::Published || root.is_reply() {
        return Err(EngineError::NotFound("Comment not found".to_string()));
    }

    let rows = sqlx::query_as::<_, CommentRow>(&format!(
        "{} WHERE c.parent_id = ? AND c.status = 'published' ORDER BY c.created_at ASC, c.id ASC",
        COMMENT_SELECT
    ))
    .bind(root_id)
    .fetch_all(pool)
    .await?;

    let mut replies = rows
        .into_iter()
        .map(Comment::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(viewer) = viewer {
        attach_viewer_state(pool, viewer.id, &mut replies).await?;
    }
    Ok(replies)
}

/// Single comment. Non-published comments are only visible to their author
/// and to moderators.
pub async fn get_comment(
    pool: &SqlitePool,
    comment_id: i64,
    viewer: Option<&Actor>,
) -> Result<Comment, EngineError> {
    let mut comment = require_comment(pool, comment_id).await?;

    let visible = match comment.status {
        CommentStatus::Published => true,
        CommentStatus::Deleted => viewer.is_some_and(Actor::can_moderate),
        CommentStatus::Pending | CommentStatus::Hidden => viewer
            .is_some_and(|actor| actor.can_moderate() || actor.id == comment.author.id),
    };

    if !visible {
        return Err(EngineError::NotFound("Comment not found".to_string()));
    }
    if let Some(viewer) = viewer {
        attach_viewer_state(pool, viewer.id, std::slice::from_mut(&mut comment)).await?;
    }
    Ok(comment)
}

pub async fn create_comment(
    pool: &SqlitePool,
    target: &TargetHandle,
    author: &Actor,
    text: &str,
    parent: Option<i64>,
    initial_status: CommentStatus,
) -> Result<Comment, EngineError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EngineError::EmptyText);
    }

    let mut tx = db::begin_write(pool).await?;

    let root = match parent {
        Some(parent_id) => Some(resolve_reply_root(&mut tx, target, parent_id).await?),
        None => None,
    };

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO comments (content_type, object_id, author_id, parent_id, text, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(target.content_type().as_str())
    .bind(target.object_id())
    .bind(author.id)
    .bind(root.as_ref().map(|r| r.id))
    .bind(text)
    .bind(initial_status.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if let Some(root) = &root {
        adjust_reply_count(&mut tx, root.id, 1).await?;
    }

    let comment = require_comment(&mut *tx, result.last_insert_rowid()).await?;
    tx.commit().await?;

    tracing::info!(
        comment_id = comment.id,
        author_id = author.id,
        content_target = %target,
        parent_id = ?comment.parent,
        "Comment created"
    );

    if let Some(root) = root {
        notify::notify_reply(pool, root.author.id, &comment).await;
    }

    Ok(comment)
}

/// Validates a requested parent and flattens it to its top-level ancestor.
async fn resolve_reply_root(
    conn: &mut SqliteConnection,
    target: &TargetHandle,
    parent_id: i64,
) -> Result<Comment, EngineError> {
    let parent = fetch_comment(&mut *conn, parent_id)
        .await?
        .ok_or_else(|| EngineError::InvalidParent("Parent comment not found".to_string()))?;

    if parent.content_type != target.content_type() || parent.object_id != target.object_id() {
        return Err(EngineError::InvalidParent(
            "Parent comment does not belong to this target".to_string(),
        ));
    }
    if parent.status == CommentStatus::Deleted {
        return Err(EngineError::InvalidParent(
            "Parent comment was deleted".to_string(),
        ));
    }

    let Some(root_id) = parent.parent else {
        return Ok(parent);
    };

    let root = fetch_comment(&mut *conn, root_id)
        .await?
        .ok_or_else(|| EngineError::InvalidParent("Parent thread no longer exists".to_string()))?;
    if root.status == CommentStatus::Deleted {
        return Err(EngineError::InvalidParent(
            "Parent comment was deleted".to_string(),
        ));
    }
    Ok(root)
}

pub async fn update_comment(
    pool: &SqlitePool,
    comment_id: i64,
    actor: &Actor,
    text: &str,
) -> Result<Comment, EngineError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EngineError::EmptyText);
    }

    let mut tx = db::begin_write(pool).await?;
    let comment = require_comment(&mut *tx, comment_id).await?;
    if comment.status == CommentStatus::Deleted {
        return Err(EngineError::NotFound("Comment not found".to_string()));
    }
    if comment.author.id != actor.id {
        return Err(EngineError::Forbidden(
            "Not authorized to edit this comment".to_string(),
        ));
    }

    let now = Utc::now();
    sqlx::query(
        "UPDATE comments SET text = ?, is_edited = TRUE, edited_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(text)
    .bind(now)
    .bind(now)
    .bind(comment_id)
    .execute(&mut *tx)
    .await?;

    let updated = require_comment(&mut *tx, comment_id).await?;
    tx.commit().await?;

    tracing::debug!(comment_id, actor_id = actor.id, "Comment edited");
    Ok(updated)
}

/// Marks a comment deleted without removing the row. Deleting an already
/// deleted comment is a no-op.
pub async fn soft_delete(
    pool: &SqlitePool,
    comment_id: i64,
    actor: &Actor,
) -> Result<(), EngineError> {
    let mut tx = db::begin_write(pool).await?;
    let comment = require_comment(&mut *tx, comment_id).await?;

    let is_author = comment.author.id == actor.id;
    if !is_author && !actor.can_moderate() {
        return Err(EngineError::Forbidden(
            "Not authorized to delete this comment".to_string(),
        ));
    }
    if comment.status == CommentStatus::Deleted {
        return Ok(());
    }

    apply_status(&mut tx, &comment, CommentStatus::Deleted).await?;

    if !is_author {
        append_record(
            &mut tx,
            comment.id,
            ModerationAction::Delete,
            Some(actor.id),
            Some("soft delete"),
            comment.status,
            CommentStatus::Deleted,
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(comment_id, actor_id = actor.id, "Comment soft-deleted");
    Ok(())
}

/// Physically removes a comment. Hard-deleting a root also purges its
/// replies; every purged row gets its own audit record first.
///
/// Returns the ids that were purged.
pub async fn hard_delete(
    pool: &SqlitePool,
    comment_id: i64,
    moderator: &Actor,
    reason: &str,
) -> Result<Vec<i64>, EngineError> {
    if !moderator.can_moderate() {
        return Err(EngineError::Forbidden("Moderator access required".to_string()));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation(
            "A reason is required for hard delete".to_string(),
        ));
    }

    let mut tx = db::begin_write(pool).await?;
    let comment = require_comment(&mut *tx, comment_id).await?;

    append_record(
        &mut tx,
        comment.id,
        ModerationAction::Delete,
        Some(moderator.id),
        Some(reason),
        comment.status,
        CommentStatus::Deleted,
    )
    .await?;

    let mut purged = vec![comment.id];

    match comment.parent {
        Some(root_id) => {
            if comment.status.is_live() {
                adjust_reply_count(&mut tx, root_id, -1).await?;
            }
        }
        None => {
            let replies: Vec<(i64, String)> =
                sqlx::query_as("SELECT id, status FROM comments WHERE parent_id = ? ORDER BY id")
                    .bind(comment.id)
                    .fetch_all(&mut *tx)
                    .await?;

            let cascade_reason = format!("cascade: root comment {} hard-deleted: {}", comment.id, reason);
            for (reply_id, status) in replies {
                let old_status = CommentStatus::parse(&status).unwrap_or(CommentStatus::Deleted);
                append_record(
                    &mut tx,
                    reply_id,
                    ModerationAction::Delete,
                    Some(moderator.id),
                    Some(&cascade_reason),
                    old_status,
                    CommentStatus::Deleted,
                )
                .await?;
                purged.push(reply_id);
            }
        }
    }

    for id in &purged {
        purge_row(&mut tx, *id).await?;
    }

    tx.commit().await?;

    tracing::warn!(
        comment_id,
        moderator_id = moderator.id,
        purged = purged.len(),
        "Comment hard-deleted"
    );
    Ok(purged)
}

async fn purge_row(conn: &mut SqliteConnection, comment_id: i64) -> Result<(), EngineError> {
    sqlx::query("DELETE FROM comment_interactions WHERE comment_id = ?")
        .bind(comment_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM comment_reports WHERE comment_id = ?")
        .bind(comment_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM notifications WHERE comment_id = ?")
        .bind(comment_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(comment_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Writes a new status and keeps the root's `reply_count` equal to its
/// number of live replies.
pub(crate) async fn apply_status(
    conn: &mut SqliteConnection,
    comment: &Comment,
    new_status: CommentStatus,
) -> Result<(), EngineError> {
    sqlx::query("UPDATE comments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(new_status.as_str())
        .bind(Utc::now())
        .bind(comment.id)
        .execute(&mut *conn)
        .await?;

    if let Some(root_id) = comment.parent {
        match (comment.status.is_live(), new_status.is_live()) {
            (true, false) => adjust_reply_count(conn, root_id, -1).await?,
            (false, true) => adjust_reply_count(conn, root_id, 1).await?,
            _ => {}
        }
    }
    Ok(())
}

async fn adjust_reply_count(
    conn: &mut SqliteConnection,
    root_id: i64,
    delta: i64,
) -> Result<(), EngineError> {
    sqlx::query("UPDATE comments SET reply_count = MAX(reply_count + ?, 0) WHERE id = ?")
        .bind(delta)
        .bind(root_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
