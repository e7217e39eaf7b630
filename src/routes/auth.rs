use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::engine::store::upsert_actor;
use crate::error::EngineError;
use crate::models::Actor;

/// Identity asserted by the external session layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_moderator: bool,
    pub exp: usize,
}

impl Claims {
    fn into_actor(self) -> Result<Actor, EngineError> {
        let id = self
            .sub
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| EngineError::Unauthenticated("Invalid token subject".to_string()))?;

        Ok(Actor {
            id,
            display_name: self.name,
            avatar_url: self.avatar_url,
            is_admin: self.is_admin,
            is_moderator: self.is_moderator,
        })
    }
}

// ============================
// Helper: JWT
// ============================

pub fn issue_token(secret: &str, actor: &Actor, ttl: Duration) -> Result<String, EngineError> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| EngineError::Validation("token lifetime out of range".to_string()))?
        .timestamp()
        .max(0) as usize;

    let claims = Claims {
        sub: actor.id.to_string(),
        name: actor.display_name.clone(),
        avatar_url: actor.avatar_url.clone(),
        is_admin: actor.is_admin,
        is_moderator: actor.is_moderator,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| EngineError::Database(format!("failed to sign token: {}", e)))
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, EngineError> {
    let Some(auth_header) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };

    auth_header
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| EngineError::Unauthenticated("Invalid authorization header".to_string()))
}

fn decode_actor(secret: &str, token: &str) -> Result<Actor, EngineError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| EngineError::Unauthenticated("Invalid token".to_string()))?;

    token_data.claims.into_actor()
}

// ============================
// Extraction
// ============================

/// Decodes the bearer token and records the actor snapshot used for author
/// display.
pub async fn extract_current_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, EngineError> {
    let token = bearer_token(headers)?
        .ok_or_else(|| EngineError::Unauthenticated("Missing authorization header".to_string()))?;
    let actor = decode_actor(&state.jwt_secret, token)?;

    upsert_actor(&state.pool, &actor).await?;
    Ok(actor)
}

/// Like [`extract_current_actor`], but anonymous callers and bad tokens yield
/// `None` instead of an error.
pub async fn extract_optional_actor(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Actor>, EngineError> {
    let Ok(Some(token)) = bearer_token(headers) else {
        return Ok(None);
    };
    let Ok(actor) = decode_actor(&state.jwt_secret, token) else {
        return Ok(None);
    };

    upsert_actor(&state.pool, &actor).await?;
    Ok(Some(actor))
}

pub async fn extract_moderator(state: &AppState, headers: &HeaderMap) -> Result<Actor, EngineError> {
    let actor = extract_current_actor(state, headers).await?;
    crate::engine::moderation::require_moderator(&actor)?;
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn issued_tokens_decode_back_to_the_actor() {
        let actor = Actor {
            id: 12,
            display_name: "Mia".to_string(),
            avatar_url: Some("/avatars/12.png".to_string()),
            is_admin: false,
            is_moderator: true,
        };
        let token = issue_token("secret", &actor, Duration::hours(1)).unwrap();
        let headers = headers_with(&token);

        let token = bearer_token(&headers).unwrap().unwrap();
        assert_eq!(decode_actor("secret", token).unwrap(), actor);
        assert!(matches!(
            decode_actor("other-secret", token),
            Err(EngineError::Unauthenticated(_))
        ));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());
        assert_eq!(bearer_token(&HeaderMap::new()).unwrap(), None);
    }
}
