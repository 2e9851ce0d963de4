use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::jwt;
use crate::config::Config;
use crate::error::AppError;

/// Optional identity from the `Authorization: Bearer` header. Guests (no
/// header, or a token that does not verify) get `None` and play against the
/// local record only.
#[derive(Debug, Clone, Copy)]
pub struct MaybeIdentity(pub Option<i64>);

impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let config = parts
            .extensions
            .get::<Config>()
            .ok_or(AppError::Internal("Missing config".into()))?;

        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")));

        Ok(MaybeIdentity(token.and_then(|t| jwt::verify_token(t, &config.jwt_secret))))
    }
}
