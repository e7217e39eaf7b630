use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::engine::target::{ContentType, RawObjectId, TargetHandle};
use crate::error::EngineError;
use crate::models::{CommentAuthor, InteractionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Pending,
    Published,
    Hidden,
    Deleted,
}

impl CommentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Hidden => "hidden",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            "hidden" => Some(Self::Hidden),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_live(self) -> bool {
        self != Self::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: CommentAuthor,
    pub content_type: ContentType,
    pub object_id: i64,
    pub parent: Option<i64>,
    pub text: String,
    pub status: CommentStatus,
    pub is_flagged: bool,
    pub like_count: i64,
    pub dislike_count: i64,
    pub reply_count: i64,
    pub report_count: i64,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The requesting actor's own like/dislike state. Absent for anonymous
    /// reads and for write responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_interaction: Option<InteractionState>,
}

impl Comment {
    pub fn target(&self) -> Result<TargetHandle, EngineError> {
        TargetHandle::new(self.content_type, self.object_id)
    }

    pub fn is_reply(&self) -> bool {
        self.parent.is_some()
    }
}

/// Flat row produced by the comment + author join.
#[derive(Debug, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub content_type: String,
    pub object_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub text: String,
    pub status: String,
    pub is_flagged: bool,
    pub like_count: i64,
    pub dislike_count: i64,
    pub reply_count: i64,
    pub report_count: i64,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub author_is_admin: bool,
}

impl TryFrom<CommentRow> for Comment {
    type Error = EngineError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let content_type = ContentType::parse(&row.content_type).ok_or_else(|| {
            EngineError::Database(format!(
                "comment {} has unknown content_type '{}'",
                row.id, row.content_type
            ))
        })?;
        let status = CommentStatus::parse(&row.status).ok_or_else(|| {
            EngineError::Database(format!(
                "comment {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;

        Ok(Self {
            id: row.id,
            author: CommentAuthor {
                id: row.author_id,
                display_name: row.author_display_name,
                avatar_url: row.author_avatar_url,
                is_admin: row.author_is_admin,
            },
            content_type,
            object_id: row.object_id,
            parent: row.parent_id,
            text: row.text,
            status,
            is_flagged: row.is_flagged,
            like_count: row.like_count,
            dislike_count: row.dislike_count,
            reply_count: row.reply_count,
            report_count: row.report_count,
            is_edited: row.is_edited,
            edited_at: row.edited_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            viewer_interaction: None,
        })
    }
}

/// A root comment with its flat, oldest-first reply list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentThread {
    pub root: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentOrdering {
    #[default]
    Newest,
    Oldest,
    MostLiked,
    LeastLiked,
}

impl CommentOrdering {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw.trim() {
            "" | "-created_at" => Ok(Self::Newest),
            "created_at" => Ok(Self::Oldest),
            "-like_count" => Ok(Self::MostLiked),
            "like_count" => Ok(Self::LeastLiked),
            other => Err(EngineError::Validation(format!(
                "Invalid ordering '{}'. Use -created_at|created_at|-like_count|like_count",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "-created_at",
            Self::Oldest => "created_at",
            Self::MostLiked => "-like_count",
            Self::LeastLiked => "like_count",
        }
    }

    pub(crate) fn order_by_clause(self) -> &'static str {
        match self {
            Self::Newest => "c.created_at DESC, c.id DESC",
            Self::Oldest => "c.created_at ASC, c.id ASC",
            Self::MostLiked => "c.like_count DESC, c.created_at DESC, c.id DESC",
            Self::LeastLiked => "c.like_count ASC, c.created_at DESC, c.id DESC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub content_type_name: String,
    pub object_id: RawObjectId,
    pub text: String,
    pub parent: Option<i64>,
}

impl CreateComment {
    pub fn new(target: &TargetHandle, text: impl Into<String>, parent: Option<i64>) -> Self {
        Self {
            content_type_name: target.content_type().as_str().to_string(),
            object_id: RawObjectId(target.object_id().to_string()),
            text: text.into(),
            parent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateComment {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentListQuery {
    pub content_type: Option<String>,
    pub object_id: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub ordering: Option<String>,
}
