use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool and bootstraps the schema.
///
/// In-memory URLs are pinned to one connection that never idles out, since
/// every SQLite memory connection is its own database.
pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS actors (
            id INTEGER PRIMARY KEY,
            display_name TEXT NOT NULL,
            avatar_url TEXT NULL,
            is_admin BOOLEAN NOT NULL DEFAULT FALSE,
            is_moderator BOOLEAN NOT NULL DEFAULT FALSE,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_type TEXT NOT NULL,
            object_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL,
            parent_id INTEGER NULL,
            text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'published',
            is_flagged BOOLEAN NOT NULL DEFAULT FALSE,
            like_count INTEGER NOT NULL DEFAULT 0,
            dislike_count INTEGER NOT NULL DEFAULT 0,
            reply_count INTEGER NOT NULL DEFAULT 0,
            report_count INTEGER NOT NULL DEFAULT 0,
            is_edited BOOLEAN NOT NULL DEFAULT FALSE,
            edited_at DATETIME NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            CONSTRAINT chk_comments_status CHECK (status IN ('pending', 'published', 'hidden', 'deleted')),
            CONSTRAINT fk_comments_author_id FOREIGN KEY (author_id) REFERENCES actors(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_comments_target_created_at ON comments (content_type, object_id, created_at)",
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments (parent_id)")
        .execute(&pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comment_interactions (
            actor_id INTEGER NOT NULL,
            comment_id INTEGER NOT NULL,
            liked BOOLEAN NOT NULL DEFAULT FALSE,
            disliked BOOLEAN NOT NULL DEFAULT FALSE,
            updated_at DATETIME NOT NULL,
            PRIMARY KEY (actor_id, comment_id),
            CONSTRAINT chk_interactions_exclusive CHECK (NOT (liked AND disliked))
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comment_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            comment_id INTEGER NOT NULL,
            reporter_id INTEGER NOT NULL,
            reason TEXT NULL,
            created_at DATETIME NOT NULL,
            UNIQUE (comment_id, reporter_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // No foreign key to comments: audit rows outlive hard-deleted comments.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS moderation_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            comment_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            moderator_id INTEGER NULL,
            reason TEXT NULL,
            old_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_moderation_records_comment_id ON moderation_records (comment_id, id)",
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_moderation_records_no_update
        BEFORE UPDATE ON moderation_records
        BEGIN
            SELECT RAISE(ABORT, 'moderation records are append-only');
        END
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_moderation_records_no_delete
        BEFORE DELETE ON moderation_records
        BEGIN
            SELECT RAISE(ABORT, 'moderation records are append-only');
        END
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            recipient_id INTEGER NOT NULL,
            actor_id INTEGER NOT NULL,
            comment_id INTEGER NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT FALSE,
            created_at DATETIME NOT NULL,
            CONSTRAINT chk_notifications_kind CHECK (kind IN ('reply', 'like'))
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications (recipient_id, is_read, created_at)",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Opens a transaction that holds the write lock from its first statement.
///
/// A deferred `BEGIN` that reads before writing has to upgrade its lock,
/// and SQLite fails that upgrade with `SQLITE_BUSY` without waiting.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    init_db("sqlite::memory:")
        .await
        .expect("in-memory database should initialise")
}
