use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The authenticated caller, as asserted by the external session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Actor {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_moderator: bool,
}

impl Actor {
    pub fn can_moderate(&self) -> bool {
        self.is_admin || self.is_moderator
    }
}

/// Author snapshot embedded in every comment response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
}

impl From<&Actor> for CommentAuthor {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id,
            display_name: actor.display_name.clone(),
            avatar_url: actor.avatar_url.clone(),
            is_admin: actor.is_admin,
        }
    }
}
