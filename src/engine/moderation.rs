//! Moderation Engine: visibility state machine, bulk and automatic
//! moderation, and the append-only audit trail.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::config::ModerationSettings;
use crate::db;
use crate::engine::store::{COMMENT_SELECT, apply_status, require_comment};
use crate::engine::target::ContentType;
use crate::error::EngineError;
use crate::models::{
    Actor, AutoModerationResult, BulkModerationResult, Comment, CommentRow, CommentStatus,
    ModerationAction, ModerationListQuery, ModerationQueueItem, ModerationRecord,
    ModerationRecordRow, ModerationStats, ModeratorActivity, Page, PageRequest, SkippedComment, StatusCounts,
};

pub const MAX_BULK_IDS: usize = 500;
pub const MAX_STATS_WINDOW_DAYS: i64 = 365;
pub const DEFAULT_STATS_WINDOW_DAYS: i64 = 30;
const RISK_FROM_REPORTS_CAP: i64 = 100;
const TOP_MODERATORS: i64 = 5;

pub fn require_moderator(actor: &Actor) -> Result<(), EngineError> {
    if actor.can_moderate() {
        Ok(())
    } else {
        Err(EngineError::Forbidden("Moderator access required".to_string()))
    }
}

/// Transition table. Returns the resulting `(status, is_flagged)` pair, or
/// `InvalidTransition` when the action is not allowed from the current state.
pub fn next_state(
    status: CommentStatus,
    is_flagged: bool,
    action: ModerationAction,
) -> Result<(CommentStatus, bool), EngineError> {
    use CommentStatus::*;
    use ModerationAction::*;

    let next = match (status, action) {
        (Deleted, _) => None,
        (Pending | Hidden, Approve) => Some((Published, is_flagged)),
        (Pending | Published, Hide) => Some((Hidden, is_flagged)),
        (Pending | Published | Hidden, Delete) => Some((Deleted, is_flagged)),
        (_, Flag) if !is_flagged => Some((status, true)),
        (_, Unflag) if is_flagged => Some((status, false)),
        _ => None,
    };

    next.ok_or_else(|| {
        EngineError::InvalidTransition(format!(
            "cannot {} a {}{} comment",
            action.as_str(),
            if is_flagged { "flagged " } else { "" },
            status.as_str()
        ))
    })
}

pub(crate) async fn append_record(
    conn: &mut SqliteConnection,
    comment_id: i64,
    action: ModerationAction,
    moderator_id: Option<i64>,
    reason: Option<&str>,
    old_status: CommentStatus,
    new_status: CommentStatus,
) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO moderation_records (comment_id, action, moderator_id, reason, old_status, new_status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(comment_id)
    .bind(action.as_str())
    .bind(moderator_id)
    .bind(reason)
    .bind(old_status.as_str())
    .bind(new_status.as_str())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn moderate(
    pool: &SqlitePool,
    comment_id: i64,
    moderator: &Actor,
    action: ModerationAction,
    reason: Option<&str>,
) -> Result<Comment, EngineError> {
    require_moderator(moderator)?;

    let mut tx = db::begin_write(pool).await?;
    let comment = moderate_in(&mut tx, comment_id, Some(moderator.id), action, reason).await?;
    tx.commit().await?;

    tracing::info!(
        comment_id,
        moderator_id = moderator.id,
        action = action.as_str(),
        status = comment.status.as_str(),
        "Comment moderated"
    );
    Ok(comment)
}

async fn moderate_in(
    conn: &mut SqliteConnection,
    comment_id: i64,
    moderator_id: Option<i64>,
    action: ModerationAction,
    reason: Option<&str>,
) -> Result<Comment, EngineError> {
    let comment = require_comment(&mut *conn, comment_id).await?;
    let (new_status, new_flag) = next_state(comment.status, comment.is_flagged, action)?;

    if new_status != comment.status {
        apply_status(conn, &comment, new_status).await?;
    }
    if new_flag != comment.is_flagged {
        sqlx::query("UPDATE comments SET is_flagged = ?, updated_at = ? WHERE id = ?")
            .bind(new_flag)
            .bind(Utc::now())
            .bind(comment_id)
            .execute(&mut *conn)
            .await?;
    }

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    append_record(
        conn,
        comment_id,
        action,
        moderator_id,
        reason,
        comment.status,
        new_status,
    )
    .await?;

    require_comment(&mut *conn, comment_id).await
}

/// Applies one action to many comments. Each id commits on its own; failures
/// are skipped and reported, never rolled back across the batch.
pub async fn bulk_moderate(
    pool: &SqlitePool,
    comment_ids: &[i64],
    moderator: &Actor,
    action: ModerationAction,
    reason: Option<&str>,
) -> Result<BulkModerationResult, EngineError> {
    require_moderator(moderator)?;
    if comment_ids.is_empty() {
        return Err(EngineError::Validation("comment_ids must not be empty".to_string()));
    }
    if comment_ids.len() > MAX_BULK_IDS {
        return Err(EngineError::Validation(format!(
            "At most {} comment ids per batch",
            MAX_BULK_IDS
        )));
    }

    let mut moderated_count = 0;
    let mut skipped = Vec::new();

    for &comment_id in comment_ids {
        let result = async {
            let mut tx = db::begin_write(pool).await?;
            moderate_in(&mut tx, comment_id, Some(moderator.id), action, reason).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(())
        }
        .await;

        match result {
            Ok(()) => moderated_count += 1,
            Err(error) => {
                tracing::warn!(
                    comment_id,
                    action = action.as_str(),
                    "Bulk moderation skipped comment: {}",
                    error
                );
                skipped.push(SkippedComment {
                    id: comment_id,
                    reason: error.to_string(),
                });
            }
        }
    }

    tracing::info!(
        moderator_id = moderator.id,
        action = action.as_str(),
        moderated_count,
        skipped = skipped.len(),
        "Bulk moderation finished"
    );

    Ok(BulkModerationResult {
        moderated_count,
        skipped,
    })
}

pub fn risk_score(report_count: i64, is_flagged: bool, settings: &ModerationSettings) -> i64 {
    let from_reports = report_count
        .max(0)
        .saturating_mul(settings.report_weight)
        .min(RISK_FROM_REPORTS_CAP);
    from_reports + if is_flagged { settings.flag_weight } else { 0 }
}

/// Flags every live, unflagged comment whose risk score exceeds the
/// threshold. Comments it flagged are excluded next time, so a second run
/// without new reports flags nothing.
pub async fn auto_moderate(
    pool: &SqlitePool,
    settings: &ModerationSettings,
) -> Result<AutoModerationResult, EngineError> {
    let mut tx = db::begin_write(pool).await?;

    let candidates: Vec<(i64, i64, String)> = sqlx::query_as(
        r#"
        SELECT id, report_count, status
        FROM comments
        WHERE status != 'deleted' AND is_flagged = FALSE AND report_count > 0
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?;

    let mut flagged_count = 0;
    for (comment_id, report_count, status) in candidates {
        let score = risk_score(report_count, false, settings);
        if score <= settings.risk_threshold {
            continue;
        }

        let status = CommentStatus::parse(&status).ok_or_else(|| {
            EngineError::Database(format!("comment {} has unknown status '{}'", comment_id, status))
        })?;

        sqlx::query("UPDATE comments SET is_flagged = TRUE, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;

        let reason = format!("auto-moderation: risk score {}", score);
        append_record(
            &mut tx,
            comment_id,
            ModerationAction::Flag,
            None,
            Some(&reason),
            status,
            status,
        )
        .await?;
        flagged_count += 1;
    }

    tx.commit().await?;

    if flagged_count > 0 {
        tracing::info!(flagged_count, "Auto-moderation flagged comments");
    } else {
        tracing::debug!("Auto-moderation found nothing new");
    }

    Ok(AutoModerationResult { flagged_count })
}

pub async fn history(pool: &SqlitePool, comment_id: i64) -> Result<Vec<ModerationRecord>, EngineError> {
    let rows = sqlx::query_as::<_, ModerationRecordRow>(
        r#"
        SELECT id, comment_id, action, moderator_id, reason, old_status, new_status, created_at
        FROM moderation_records
        WHERE comment_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(comment_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(record_from_row).collect()
}

fn record_from_row(row: ModerationRecordRow) -> Result<ModerationRecord, EngineError> {
    let corrupt = |field: &str, value: &str| {
        EngineError::Database(format!(
            "moderation record {} has unknown {} '{}'",
            row.id, field, value
        ))
    };

    Ok(ModerationRecord {
        id: row.id,
        comment_id: row.comment_id,
        action: ModerationAction::parse(&row.action).ok_or_else(|| corrupt("action", &row.action))?,
        moderator_id: row.moderator_id,
        reason: row.reason.clone(),
        old_status: CommentStatus::parse(&row.old_status)
            .ok_or_else(|| corrupt("old_status", &row.old_status))?,
        new_status: CommentStatus::parse(&row.new_status)
            .ok_or_else(|| corrupt("new_status", &row.new_status))?,
        created_at: row.created_at,
    })
}

/// Parsed filters for the moderation queue.
#[derive(Debug, Clone, Default)]
pub struct ModerationFilter {
    pub status: Option<CommentStatus>,
    pub flagged: Option<bool>,
    pub content_type: Option<ContentType>,
    pub search: Option<String>,
    /// Highest risk first instead of newest first.
    pub by_risk: bool,
}

impl ModerationFilter {
    pub fn from_query(query: &ModerationListQuery) -> Result<Self, EngineError> {
        let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(CommentStatus::parse(raw).ok_or_else(|| {
                EngineError::Validation(
                    "Invalid status filter. Use pending|published|hidden|deleted".to_string(),
                )
            })?),
            None => None,
        };
        let content_type = match query.content_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(ContentType::parse(raw).ok_or_else(|| {
                EngineError::InvalidTarget(format!("unknown content_type '{}'", raw))
            })?),
            None => None,
        };
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);
        let by_risk = match query.ordering.as_deref().map(str::trim) {
            None | Some("") | Some("-created_at") => false,
            Some("-risk_score") => true,
            Some(other) => {
                return Err(EngineError::Validation(format!(
                    "Invalid ordering '{}'. Use -created_at|-risk_score",
                    other
                )));
            }
        };

        Ok(Self {
            status,
            flagged: query.flagged,
            content_type,
            search,
            by_risk,
        })
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");
        if let Some(status) = self.status {
            builder.push(" AND c.status = ").push_bind(status.as_str());
        }
        if let Some(flagged) = self.flagged {
            builder.push(" AND c.is_flagged = ").push_bind(flagged);
        }
        if let Some(content_type) = self.content_type {
            builder.push(" AND c.content_type = ").push_bind(content_type.as_str());
        }
        if let Some(search) = &self.search {
            builder.push(" AND c.text LIKE ").push_bind(format!("%{}%", search));
        }
    }
}

/// Moderation queue: every status, newest first or riskiest first. Each
/// entry carries its [`risk_score`], so an already flagged comment outranks
/// an unflagged one with the same reports.
pub async fn list_for_moderation(
    pool: &SqlitePool,
    filter: &ModerationFilter,
    settings: &ModerationSettings,
    page: PageRequest,
) -> Result<Page<ModerationQueueItem>, EngineError> {
    let mut query_builder = QueryBuilder::<Sqlite>::new(COMMENT_SELECT);
    filter.push_where(&mut query_builder);
    query_builder.push(" ORDER BY ");
    if filter.by_risk {
        query_builder
            .push("MIN(MAX(c.report_count, 0) * ")
            .push_bind(settings.report_weight)
            .push(", ")
            .push_bind(RISK_FROM_REPORTS_CAP)
            .push(") + CASE WHEN c.is_flagged THEN ")
            .push_bind(settings.flag_weight)
            .push(" ELSE 0 END DESC, ");
    }
    query_builder
        .push("c.created_at DESC, c.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<CommentRow> = query_builder.build_query_as().fetch_all(pool).await?;

    let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM comments c");
    filter.push_where(&mut count_builder);
    let (count,): (i64,) = count_builder.build_query_as().fetch_one(pool).await?;

    let results = rows
        .into_iter()
        .map(|row| {
            let comment = Comment::try_from(row)?;
            let risk_score = risk_score(comment.report_count, comment.is_flagged, settings);
            Ok(ModerationQueueItem { comment, risk_score })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(Page::new(results, count, page))
}

/// Read-only aggregate over comments, reports and the audit log.
pub async fn stats(pool: &SqlitePool, window_days: i64) -> Result<ModerationStats, EngineError> {
    if !(1..=MAX_STATS_WINDOW_DAYS).contains(&window_days) {
        return Err(EngineError::Validation(format!(
            "days must be between 1 and {}",
            MAX_STATS_WINDOW_DAYS
        )));
    }
    let since = Utc::now() - Duration::days(window_days);

    let status_rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM comments GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut by_status = StatusCounts::default();
    for (status, count) in status_rows {
        match CommentStatus::parse(&status) {
            Some(CommentStatus::Pending) => by_status.pending = count,
            Some(CommentStatus::Published) => by_status.published = count,
            Some(CommentStatus::Hidden) => by_status.hidden = count,
            Some(CommentStatus::Deleted) => by_status.deleted = count,
            None => tracing::warn!(status, count, "Ignoring comments with unknown status"),
        }
    }
    let total_comments =
        by_status.pending + by_status.published + by_status.hidden + by_status.deleted;

    let (flagged_total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM comments WHERE is_flagged = TRUE")
            .fetch_one(pool)
            .await?;

    let (reports_in_window,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM comment_reports WHERE created_at >= ?")
            .bind(since)
            .fetch_one(pool)
            .await?;

    let day_rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT substr(created_at, 1, 10) AS day, COUNT(*)
        FROM moderation_records
        WHERE created_at >= ?
        GROUP BY day
        ORDER BY day
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    let actions_per_day: BTreeMap<String, i64> = day_rows.into_iter().collect();

    let top_moderators = sqlx::query_as::<_, ModeratorActivity>(
        r#"
        SELECT m.moderator_id AS moderator_id, a.display_name AS display_name, COUNT(*) AS action_count
        FROM moderation_records m
        LEFT JOIN actors a ON a.id = m.moderator_id
        WHERE m.moderator_id IS NOT NULL AND m.created_at >= ?
        GROUP BY m.moderator_id, a.display_name
        ORDER BY action_count DESC, m.moderator_id ASC
        LIMIT ?
        "#,
    )
    .bind(since)
    .bind(TOP_MODERATORS)
    .fetch_all(pool)
    .await?;

    Ok(ModerationStats {
        window_days,
        total_comments,
        by_status,
        flagged_total,
        reports_in_window,
        actions_per_day,
        top_moderators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ledger::report;
    use crate::engine::store::create_comment;
    use crate::engine::store::tests::{actor, moderator, seeded_pool};
    use crate::engine::target::resolve;

    #[test]
    fn transition_table_matches_state_machine() {
        use CommentStatus::*;
        use ModerationAction::*;

        assert_eq!(next_state(Pending, false, Approve).unwrap(), (Published, false));
        assert_eq!(next_state(Hidden, true, Approve).unwrap(), (Published, true));
        assert_eq!(next_state(Published, false, Hide).unwrap(), (Hidden, false));
        assert_eq!(next_state(Hidden, false, Delete).unwrap(), (Deleted, false));
        assert_eq!(next_state(Published, false, Flag).unwrap(), (Published, true));
        assert_eq!(next_state(Pending, true, Unflag).unwrap(), (Pending, false));

        assert!(next_state(Published, false, Approve).is_err());
        assert!(next_state(Hidden, false, Hide).is_err());
        assert!(next_state(Published, true, Flag).is_err());
        assert!(next_state(Published, false, Unflag).is_err());
    }

    #[test]
    fn deleted_is_terminal_for_every_action() {
        for action in [
            ModerationAction::Approve,
            ModerationAction::Hide,
            ModerationAction::Delete,
            ModerationAction::Flag,
            ModerationAction::Unflag,
        ] {
            for flagged in [false, true] {
                assert!(matches!(
                    next_state(CommentStatus::Deleted, flagged, action),
                    Err(EngineError::InvalidTransition(_))
                ));
            }
        }
    }

    #[test]
    fn risk_score_caps_report_contribution() {
        let settings = ModerationSettings::default();
        assert_eq!(risk_score(0, false, &settings), 0);
        assert_eq!(risk_score(3, false, &settings), 60);
        assert_eq!(risk_score(50, false, &settings), 100);
        assert_eq!(risk_score(50, true, &settings), 130);
    }

    #[tokio::test]
    async fn moderating_a_deleted_comment_changes_nothing() {
        let alice = actor(1);
        let mia = moderator(2);
        let pool = seeded_pool(&[&alice, &mia]).await;
        let target = resolve("film", "1").unwrap();
        let comment = create_comment(&pool, &target, &alice, "bye", None, CommentStatus::Published)
            .await
            .unwrap();

        moderate(&pool, comment.id, &mia, ModerationAction::Delete, Some("rule 3"))
            .await
            .unwrap();
        let err = moderate(&pool, comment.id, &mia, ModerationAction::Approve, None)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidTransition(_)));
        let stored = require_comment(&pool, comment.id).await.unwrap();
        assert_eq!(stored.status, CommentStatus::Deleted);
        assert_eq!(history(&pool, comment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn audit_rows_are_append_only() {
        let alice = actor(1);
        let mia = moderator(2);
        let pool = seeded_pool(&[&alice, &mia]).await;
        let target = resolve("story", "1").unwrap();
        let comment = create_comment(&pool, &target, &alice, "edgy", None, CommentStatus::Published)
            .await
            .unwrap();

        moderate(&pool, comment.id, &mia, ModerationAction::Hide, Some("heated"))
            .await
            .unwrap();
        let first = history(&pool, comment.id).await.unwrap();

        moderate(&pool, comment.id, &mia, ModerationAction::Approve, None)
            .await
            .unwrap();
        moderate(&pool, comment.id, &mia, ModerationAction::Flag, None)
            .await
            .unwrap();
        let later = history(&pool, comment.id).await.unwrap();

        assert_eq!(later.len(), 3);
        assert_eq!(later[0], first[0]);
        assert_eq!(later[0].old_status, CommentStatus::Published);
        assert_eq!(later[0].new_status, CommentStatus::Hidden);

        let tamper = sqlx::query("UPDATE moderation_records SET reason = 'edited'")
            .execute(&pool)
            .await;
        assert!(tamper.is_err());
        let purge = sqlx::query("DELETE FROM moderation_records").execute(&pool).await;
        assert!(purge.is_err());
    }

    #[tokio::test]
    async fn non_moderators_are_forbidden() {
        let alice = actor(1);
        let pool = seeded_pool(&[&alice]).await;
        let target = resolve("film", "1").unwrap();
        let comment = create_comment(&pool, &target, &alice, "mine", None, CommentStatus::Published)
            .await
            .unwrap();

        assert!(matches!(
            moderate(&pool, comment.id, &alice, ModerationAction::Hide, None).await,
            Err(EngineError::Forbidden(_))
        ));
        assert!(matches!(
            bulk_moderate(&pool, &[comment.id], &alice, ModerationAction::Hide, None).await,
            Err(EngineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn bulk_skips_failures_and_counts_successes() {
        let alice = actor(1);
        let mia = moderator(2);
        let pool = seeded_pool(&[&alice, &mia]).await;
        let target = resolve("film", "1").unwrap();
        let c1 = create_comment(&pool, &target, &alice, "one", None, CommentStatus::Published)
            .await
            .unwrap();
        let c2 = create_comment(&pool, &target, &alice, "two", None, CommentStatus::Published)
            .await
            .unwrap();
        moderate(&pool, c2.id, &mia, ModerationAction::Delete, None)
            .await
            .unwrap();

        let result = bulk_moderate(&pool, &[c1.id, c2.id, 9999], &mia, ModerationAction::Hide, None)
            .await
            .unwrap();

        assert_eq!(result.moderated_count, 1);
        let skipped: Vec<i64> = result.skipped.iter().map(|s| s.id).collect();
        assert_eq!(skipped, vec![c2.id, 9999]);
        assert_eq!(
            require_comment(&pool, c1.id).await.unwrap().status,
            CommentStatus::Hidden
        );
    }

    #[tokio::test]
    async fn moderator_delete_of_reply_keeps_reply_count_honest() {
        let alice = actor(1);
        let mia = moderator(2);
        let pool = seeded_pool(&[&alice, &mia]).await;
        let target = resolve("film", "1").unwrap();
        let root = create_comment(&pool, &target, &alice, "root", None, CommentStatus::Published)
            .await
            .unwrap();
        let reply = create_comment(&pool, &target, &alice, "reply", Some(root.id), CommentStatus::Published)
            .await
            .unwrap();

        moderate(&pool, reply.id, &mia, ModerationAction::Hide, None)
            .await
            .unwrap();
        assert_eq!(require_comment(&pool, root.id).await.unwrap().reply_count, 1);

        moderate(&pool, reply.id, &mia, ModerationAction::Delete, None)
            .await
            .unwrap();
        assert_eq!(require_comment(&pool, root.id).await.unwrap().reply_count, 0);
    }

    #[tokio::test]
    async fn auto_moderation_is_idempotent() {
        let alice = actor(1);
        let reporters: Vec<Actor> = (10..14).map(actor).collect();
        let mut everyone: Vec<&Actor> = reporters.iter().collect();
        everyone.push(&alice);
        let pool = seeded_pool(&everyone).await;
        let target = resolve("sneakpeek", "1").unwrap();
        let risky = create_comment(&pool, &target, &alice, "buy now", None, CommentStatus::Published)
            .await
            .unwrap();
        let mild = create_comment(&pool, &target, &alice, "meh", None, CommentStatus::Published)
            .await
            .unwrap();

        for reporter in &reporters[..3] {
            report(&pool, reporter, risky.id, Some("spam")).await.unwrap();
        }
        report(&pool, &reporters[3], mild.id, None).await.unwrap();

        let settings = ModerationSettings::default();
        let first = auto_moderate(&pool, &settings).await.unwrap();
        let second = auto_moderate(&pool, &settings).await.unwrap();

        assert_eq!(first.flagged_count, 1);
        assert_eq!(second.flagged_count, 0);
        assert!(require_comment(&pool, risky.id).await.unwrap().is_flagged);
        assert!(!require_comment(&pool, mild.id).await.unwrap().is_flagged);

        let records = history(&pool, risky.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].moderator_id, None);
        assert_eq!(records[0].action, ModerationAction::Flag);
    }

    #[tokio::test]
    async fn stats_aggregate_window_activity() {
        let alice = actor(1);
        let bob = actor(2);
        let mia = moderator(3);
        let pool = seeded_pool(&[&alice, &bob, &mia]).await;
        let target = resolve("film", "1").unwrap();
        let a = create_comment(&pool, &target, &alice, "a", None, CommentStatus::Published)
            .await
            .unwrap();
        let b = create_comment(&pool, &target, &alice, "b", None, CommentStatus::Pending)
            .await
            .unwrap();
        report(&pool, &bob, a.id, None).await.unwrap();
        moderate(&pool, a.id, &mia, ModerationAction::Flag, None).await.unwrap();
        moderate(&pool, b.id, &mia, ModerationAction::Approve, None).await.unwrap();

        let summary = stats(&pool, 7).await.unwrap();

        assert_eq!(summary.total_comments, 2);
        assert_eq!(summary.by_status.published, 2);
        assert_eq!(summary.flagged_total, 1);
        assert_eq!(summary.reports_in_window, 1);
        assert_eq!(summary.actions_per_day.values().sum::<i64>(), 2);
        assert_eq!(summary.top_moderators.len(), 1);
        assert_eq!(summary.top_moderators[0].moderator_id, mia.id);
        assert_eq!(summary.top_moderators[0].action_count, 2);

        assert!(matches!(stats(&pool, 0).await, Err(EngineError::Validation(_))));
        assert!(matches!(stats(&pool, 366).await, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn moderation_queue_filters() {
        let alice = actor(1);
        let mia = moderator(2);
        let pool = seeded_pool(&[&alice, &mia]).await;
        let film = resolve("film", "1").unwrap();
        let story = resolve("story", "1").unwrap();
        let spam = create_comment(&pool, &film, &alice, "cheap pills", None, CommentStatus::Published)
            .await
            .unwrap();
        create_comment(&pool, &film, &alice, "great scene", None, CommentStatus::Pending)
            .await
            .unwrap();
        create_comment(&pool, &story, &alice, "cheap shot", None, CommentStatus::Published)
            .await
            .unwrap();
        moderate(&pool, spam.id, &mia, ModerationAction::Flag, None).await.unwrap();

        let query = ModerationListQuery {
            content_type: Some("film".to_string()),
            search: Some("cheap".to_string()),
            ..Default::default()
        };
        let filter = ModerationFilter::from_query(&query).unwrap();
        let settings = ModerationSettings::default();
        let page = list_for_moderation(&pool, &filter, &settings, PageRequest::default()).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].comment.id, spam.id);

        let pending = ModerationFilter::from_query(&ModerationListQuery {
            status: Some("pending".to_string()),
            ..Default::default()
        })
        .unwrap();
        let page = list_for_moderation(&pool, &pending, &settings, PageRequest::default()).await.unwrap();
        assert_eq!(page.count, 1);

        let flagged = ModerationFilter {
            flagged: Some(true),
            ..Default::default()
        };
        let page = list_for_moderation(&pool, &flagged, &settings, PageRequest::default()).await.unwrap();
        assert_eq!(page.results.len(), 1);

        assert!(ModerationFilter::from_query(&ModerationListQuery {
            status: Some("archived".to_string()),
            ..Default::default()
        })
        .is_err());
    }

    #[tokio::test]
    async fn risk_ordering_ranks_flagged_comments_first() {
        let alice = actor(1);
        let critic = actor(3);
        let mia = moderator(2);
        let pool = seeded_pool(&[&alice, &critic, &mia]).await;
        let film = resolve("film", "2").unwrap();
        let older = create_comment(&pool, &film, &alice, "borderline", None, CommentStatus::Published)
            .await
            .unwrap();
        let newer = create_comment(&pool, &film, &alice, "also borderline", None, CommentStatus::Published)
            .await
            .unwrap();
        report(&pool, &critic, older.id, None).await.unwrap();
        report(&pool, &critic, newer.id, None).await.unwrap();
        moderate(&pool, older.id, &mia, ModerationAction::Flag, None).await.unwrap();

        let settings = ModerationSettings::default();
        let newest = list_for_moderation(&pool, &ModerationFilter::default(), &settings, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(newest.results[0].comment.id, newer.id);

        let riskiest = ModerationFilter::from_query(&ModerationListQuery {
            ordering: Some("-risk_score".to_string()),
            ..Default::default()
        })
        .unwrap();
        let page = list_for_moderation(&pool, &riskiest, &settings, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.results[0].comment.id, older.id);
        assert_eq!(
            page.results[0].risk_score,
            settings.report_weight + settings.flag_weight
        );
        assert_eq!(page.results[1].risk_score, settings.report_weight);

        assert!(ModerationFilter::from_query(&ModerationListQuery {
            ordering: Some("risk".to_string()),
            ..Default::default()
        })
        .is_err());
    }
}
