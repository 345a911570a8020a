use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::{state::AppState, users::errors::UserError};

/// The caller of a protected route, resolved from Basic credentials or a
/// session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub login: String,
}

/// Splits `Basic base64(login:password)` into its two halves.
pub(crate) fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_owned(), password.to_owned()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = UserError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                warn!("missing Authorization header");
                UserError::Unauthorized
            })?;

        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            let keys = JwtKeys::from_ref(state);
            let claims = keys.verify(token).map_err(|e| {
                warn!(error = %e, "invalid or expired token");
                UserError::Unauthorized
            })?;
            // tokens of users removed since issue are rejected
            let user = state
                .users
                .store()
                .get(claims.sub)
                .await?
                .ok_or(UserError::Unauthorized)?;
            return Ok(AuthUser {
                id: user.id,
                login: user.login,
            });
        }

        let (login, password) = parse_basic(auth).ok_or_else(|| {
            warn!("unsupported or malformed Authorization header");
            UserError::Unauthorized
        })?;
        let user = state
            .users
            .authenticate_credentials(&login, &password)
            .await?;
        Ok(AuthUser {
            id: user.id,
            login: user.login,
        })
    }
}
