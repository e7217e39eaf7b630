//! Notification Dispatcher.
//!
//! Emission is best-effort: a failed insert is logged and never fails the
//! write that triggered it.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::EngineError;
use crate::models::{Comment, Notification, NotificationKind, NotificationList, NotificationRow};

const LIST_LIMIT: i64 = 50;

pub async fn notify_reply(pool: &SqlitePool, recipient_id: i64, reply: &Comment) {
    if recipient_id == reply.author.id {
        return;
    }
    if let Err(error) = insert(pool, NotificationKind::Reply, recipient_id, reply.author.id, reply.id).await {
        tracing::warn!(comment_id = reply.id, recipient_id, "Failed to emit reply notification: {}", error);
    }
}

pub async fn notify_like(pool: &SqlitePool, recipient_id: i64, actor_id: i64, comment_id: i64) {
    if recipient_id == actor_id {
        return;
    }

    let pending: Result<(bool,), sqlx::Error> = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM notifications
            WHERE kind = 'like' AND recipient_id = ? AND actor_id = ? AND comment_id = ? AND is_read = FALSE
        )
        "#,
    )
    .bind(recipient_id)
    .bind(actor_id)
    .bind(comment_id)
    .fetch_one(pool)
    .await;

    let result = match pending {
        Ok((true,)) => Ok(()),
        Ok((false,)) => insert(pool, NotificationKind::Like, recipient_id, actor_id, comment_id).await,
        Err(error) => Err(error.into()),
    };
    if let Err(error) = result {
        tracing::warn!(comment_id, recipient_id, actor_id, "Failed to emit like notification: {}", error);
    }
}

async fn insert(
    pool: &SqlitePool,
    kind: NotificationKind,
    recipient_id: i64,
    actor_id: i64,
    comment_id: i64,
) -> Result<(), EngineError> {
    sqlx::query(
        "INSERT INTO notifications (kind, recipient_id, actor_id, comment_id, is_read, created_at) VALUES (?, ?, ?, ?, FALSE, ?)",
    )
    .bind(kind.as_str())
    .bind(recipient_id)
    .bind(actor_id)
    .bind(comment_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    tracing::debug!(kind = kind.as_str(), recipient_id, actor_id, comment_id, "Notification queued");
    Ok(())
}

/// Latest notifications for an actor plus the total unread count.
pub async fn list(pool: &SqlitePool, recipient_id: i64) -> Result<NotificationList, EngineError> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, kind, recipient_id, actor_id, comment_id, is_read, created_at
        FROM notifications
        WHERE recipient_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(recipient_id)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await?;

    let (unread_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = FALSE")
            .bind(recipient_id)
            .fetch_one(pool)
            .await?;

    let notifications = rows
        .into_iter()
        .map(|row| {
            let kind = NotificationKind::parse(&row.kind).ok_or_else(|| {
                EngineError::Database(format!(
                    "notification {} has unknown kind '{}'",
                    row.id, row.kind
                ))
            })?;
            Ok(Notification {
                id: row.id,
                kind,
                recipient_id: row.recipient_id,
                actor_id: row.actor_id,
                comment_ref: row.comment_id,
                is_read: row.is_read,
                created_at: row.created_at,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    Ok(NotificationList {
        unread_count,
        notifications,
    })
}

/// Marks one notification read. Repeating it is a no-op; another actor's
/// notification is reported as missing.
pub async fn mark_read(pool: &SqlitePool, notification_id: i64, recipient_id: i64) -> Result<(), EngineError> {
    let owned: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(notification_id)
            .bind(recipient_id)
            .fetch_optional(pool)
            .await?;
    if owned.is_none() {
        return Err(EngineError::NotFound("Notification not found".to_string()));
    }

    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?")
        .bind(notification_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_all_read(pool: &SqlitePool, recipient_id: i64) -> Result<u64, EngineError> {
    let updated = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE recipient_id = ? AND is_read = FALSE")
        .bind(recipient_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(updated)
}
