//! Authentication Middleware

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::api::AppState;

use super::error::AuthError;
use super::jwt::validate_access_token;

/// Authenticated caller injected into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// User ID.
    pub id: Uuid,
}

/// Middleware to require authentication.
///
/// Extracts Bearer token from Authorization header, validates JWT,
/// checks the user exists, and injects `AuthUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    // Parse Bearer token
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    // Validate JWT
    let claims = validate_access_token(token, &state.config.jwt_secret)?;

    // Parse user ID from claims
    let user_id: Uuid = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

    if state.store.find_user(user_id).await?.is_none() {
        return Err(AuthError::UserNotFound);
    }

    request.extensions_mut().insert(AuthUser { id: user_id });

    // Continue to handler
    Ok(next.run(request).await)
}

/// Extractor for the authenticated user in handlers behind [`require_auth`].
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .copied()
            .ok_or(AuthError::MissingAuthHeader)
    }
}
