//! Content Target Resolver.
//!
//! Every comment hangs off a `(content_type, object_id)` pair. Raw pairs are
//! turned into a [`TargetHandle`] here and nowhere else; the rest of the
//! engine only accepts handles.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Story,
    Film,
    Content,
    Podcast,
    Animation,
    #[serde(rename = "sneakpeek", alias = "sneak_peek", alias = "sneak-peek")]
    SneakPeek,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        Self::Story,
        Self::Film,
        Self::Content,
        Self::Podcast,
        Self::Animation,
        Self::SneakPeek,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Film => "film",
            Self::Content => "content",
            Self::Podcast => "podcast",
            Self::Animation => "animation",
            Self::SneakPeek => "sneakpeek",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "story" => Some(Self::Story),
            "film" => Some(Self::Film),
            "content" => Some(Self::Content),
            "podcast" => Some(Self::Podcast),
            "animation" => Some(Self::Animation),
            "sneakpeek" | "sneak_peek" | "sneak-peek" => Some(Self::SneakPeek),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated comment target. Only [`resolve`] (and rows already stored by
/// the engine) can produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetHandle {
    content_type: ContentType,
    object_id: i64,
}

impl TargetHandle {
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn object_id(&self) -> i64 {
        self.object_id
    }

    /// Typed constructor; the variant is already checked by the compiler so
    /// only the identifier needs validating.
    pub fn new(content_type: ContentType, object_id: i64) -> Result<Self, EngineError> {
        if object_id <= 0 {
            return Err(EngineError::InvalidTarget(format!(
                "object_id must be a positive integer, got {}",
                object_id
            )));
        }
        Ok(Self {
            content_type,
            object_id,
        })
    }
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type, self.object_id)
    }
}

/// Validates a raw `(content_type, object_id)` pair.
pub fn resolve(content_type: &str, object_id: &str) -> Result<TargetHandle, EngineError> {
    let kind = ContentType::parse(content_type).ok_or_else(|| {
        EngineError::InvalidTarget(format!("unknown content_type '{}'", content_type.trim()))
    })?;

    let raw_id = object_id.trim();
    if raw_id.is_empty() || !raw_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::InvalidTarget(format!(
            "malformed object_id '{}'",
            raw_id
        )));
    }

    let id = raw_id
        .parse::<i64>()
        .map_err(|_| EngineError::InvalidTarget(format!("object_id '{}' is out of range", raw_id)))?;

    TargetHandle::new(kind, id)
}

/// Object ids arrive as JSON numbers from some callers and strings from others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObjectId(pub String);

impl<'de> Deserialize<'de> for RawObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Either {
            Number(i64),
            Text(String),
        }

        Ok(match Either::deserialize(deserializer)? {
            Either::Number(n) => RawObjectId(n.to_string()),
            Either::Text(s) => RawObjectId(s),
        })
    }
}

impl Serialize for RawObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_known_kind() {
        for kind in ContentType::ALL {
            let handle = resolve(kind.as_str(), "42").unwrap();
            assert_eq!(handle.content_type(), kind);
            assert_eq!(handle.object_id(), 42);
        }
    }

    #[test]
    fn accepts_sneak_peek_spellings_and_padding() {
        let handle = resolve(" Sneak_Peek ", " 7 ").unwrap();
        assert_eq!(handle.content_type(), ContentType::SneakPeek);
        assert_eq!(handle.to_string(), "sneakpeek:7");
    }

    #[test]
    fn rejects_unknown_kinds_and_bad_ids() {
        assert!(matches!(resolve("album", "1"), Err(EngineError::InvalidTarget(_))));
        assert!(matches!(resolve("film", ""), Err(EngineError::InvalidTarget(_))));
        assert!(matches!(resolve("film", "-3"), Err(EngineError::InvalidTarget(_))));
        assert!(matches!(resolve("film", "12a"), Err(EngineError::InvalidTarget(_))));
        assert!(matches!(resolve("film", "0"), Err(EngineError::InvalidTarget(_))));
        assert!(matches!(
            resolve("film", "99999999999999999999"),
            Err(EngineError::InvalidTarget(_))
        ));
    }

    #[test]
    fn raw_object_id_takes_numbers_or_strings() {
        let from_number: RawObjectId = serde_json::from_str("15").unwrap();
        let from_text: RawObjectId = serde_json::from_str("\"15\"").unwrap();
        assert_eq!(from_number, from_text);
    }
}
