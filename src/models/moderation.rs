use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{Comment, CommentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    Hide,
    Delete,
    Flag,
    Unflag,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Hide => "hide",
            Self::Delete => "delete",
            Self::Flag => "flag",
            Self::Unflag => "unflag",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "hide" => Some(Self::Hide),
            "delete" => Some(Self::Delete),
            "flag" => Some(Self::Flag),
            "unflag" => Some(Self::Unflag),
            _ => None,
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub id: i64,
    pub comment_id: i64,
    pub action: ModerationAction,
    pub moderator_id: Option<i64>,
    pub reason: Option<String>,
    pub old_status: CommentStatus,
    pub new_status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct ModerationRecordRow {
    pub id: i64,
    pub comment_id: i64,
    pub action: String,
    pub moderator_id: Option<i64>,
    pub reason: Option<String>,
    pub old_status: String,
    pub new_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModerateRequest {
    pub action: ModerationAction,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkModerateRequest {
    pub comment_ids: Vec<i64>,
    pub action: ModerationAction,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardDeleteRequest {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedComment {
    pub id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkModerationResult {
    pub moderated_count: i64,
    pub skipped: Vec<SkippedComment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoModerationResult {
    pub flagged_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModerationListQuery {
    pub status: Option<String>,
    pub flagged: Option<bool>,
    pub content_type: Option<String>,
    pub search: Option<String>,
    /// `-created_at` (default) or `-risk_score`.
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// A comment in the moderation queue with its current risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationQueueItem {
    #[serde(flatten)]
    pub comment: Comment,
    pub risk_score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub published: i64,
    pub hidden: i64,
    pub deleted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ModeratorActivity {
    pub moderator_id: i64,
    pub display_name: Option<String>,
    pub action_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationStats {
    pub window_days: i64,
    pub total_comments: i64,
    pub by_status: StatusCounts,
    pub flagged_total: i64,
    pub reports_in_window: i64,
    pub actions_per_day: BTreeMap<String, i64>,
    pub top_moderators: Vec<ModeratorActivity>,
}
