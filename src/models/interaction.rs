use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Dislike,
}

/// Per (actor, comment) like/dislike state. Never both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InteractionState {
    pub liked: bool,
    pub disliked: bool,
}

/// Change to the denormalised counters caused by one toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CountDelta {
    pub likes: i64,
    pub dislikes: i64,
}

impl CountDelta {
    pub fn inverse(self) -> Self {
        Self {
            likes: -self.likes,
            dislikes: -self.dislikes,
        }
    }
}

/// Body of `POST /comments/{id}/interact/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Like,
    Dislike,
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractRequest {
    pub interaction_type: InteractionType,
    pub reason: Option<String>,
}

/// Authoritative result of an interaction, used by the client to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub comment_id: i64,
    pub liked: bool,
    pub disliked: bool,
    pub like_count: i64,
    pub dislike_count: i64,
    pub report_count: i64,
    pub reported: bool,
}

impl InteractionOutcome {
    pub fn state(&self) -> InteractionState {
        InteractionState {
            liked: self.liked,
            disliked: self.disliked,
        }
    }
}
