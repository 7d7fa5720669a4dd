use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::jwt;
use crate::db::models::User;
use crate::error::ChatError;
use crate::services::UserDirectory;

/// Reason a WebSocket handshake is refused. Sent as the HTTP response body
/// before any upgrade happens.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("No token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("User no longer exists")]
    UserNotFound,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("User no longer exists")]
    UserDeleted,

    #[error("An unexpected error has occurred")]
    Internal(#[source] ChatError),
}

impl AuthFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthFailure::MissingToken | AuthFailure::InvalidToken | AuthFailure::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthFailure::UserNotFound
            | AuthFailure::EmailNotVerified
            | AuthFailure::UserDeleted => StatusCode::FORBIDDEN,
            AuthFailure::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Resolve a handshake token to an active, verified user.
pub async fn authenticate(
    secret: &[u8],
    users: &dyn UserDirectory,
    token: Option<&str>,
) -> Result<User, AuthFailure> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthFailure::MissingToken)?;

    let claims = jwt::validate_access_token(secret, token).map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthFailure::TokenExpired,
        _ => AuthFailure::InvalidToken,
    })?;

    let user = users
        .find_user(claims.sub)
        .await
        .map_err(AuthFailure::Internal)?
        .ok_or(AuthFailure::UserNotFound)?;

    if user.deleted {
        return Err(AuthFailure::UserDeleted);
    }
    if !user.email_verified {
        return Err(AuthFailure::EmailNotVerified);
    }
    Ok(user)
}
