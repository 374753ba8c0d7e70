use std::sync::Arc;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use ring::hmac;

use crate::AppState;
use crate::db::{self, User};
use crate::error::StoreError;

/// Session tokens are `<session-id>.<hmac-sha256 hex>`, signed with the
/// configured secret key. A forged or tampered token is rejected before any
/// database lookup.
pub fn issue_token(secret: &str, session_id: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, session_id.as_bytes());
    format!("{}.{}", session_id, hex::encode(tag.as_ref()))
}

pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let (session_id, signature) = token.split_once('.')?;
    let signature = hex::decode(signature).ok()?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, session_id.as_bytes(), &signature).ok()?;
    Some(session_id.to_string())
}

/// The authenticated user behind a `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session_id: String,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = StoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(StoreError::Unauthorized)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(StoreError::Unauthorized)?;

        let session_id =
            verify_token(&state.config.secret_key, token).ok_or(StoreError::Unauthorized)?;

        let session = db::find_session(&state.db, &session_id)
            .await?
            .ok_or(StoreError::Unauthorized)?;
        if session.is_expired() {
            db::delete_session(&state.db, &session_id).await?;
            return Err(StoreError::Unauthorized);
        }

        let user = db::find_user_by_id(&state.db, session.user_id)
            .await?
            .ok_or(StoreError::Unauthorized)?;

        Ok(CurrentUser { user, session_id })
    }
}

/// Routes that work anonymously but enrich their response for logged-in
/// users take `Option<CurrentUser>`: no header means anonymous, while a
/// present-but-invalid header is still rejected.
impl OptionalFromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = StoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        if parts.headers.get(AUTHORIZATION).is_none() {
            return Ok(None);
        }
        <CurrentUser as FromRequestParts<Arc<AppState>>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}
