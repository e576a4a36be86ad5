//! Identity Middleware
//!
//! Resolves the acting user for each request. The caller presents its
//! user id in the `X-User-Id` header (session handling lives in the
//! gateway in front of this service); the middleware loads the user
//! row plus the rank priority and injects `AuthUser` into request
//! extensions for handlers to extract.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::api::AppState;
use crate::db::{self, User};

/// Header carrying the acting user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user injected into request extensions.
///
/// Carries the full user row plus the priority of their rank, loaded
/// once per request so permission and hierarchy checks do not refetch
/// it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    /// Priority of the user's rank; `None` when no rank is assigned.
    pub rank_priority: Option<i32>,
}

/// Identity error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing `X-User-Id` header.
    #[error("Missing identity header")]
    MissingIdentity,

    /// Header present but not a valid UUID.
    #[error("Invalid identity header")]
    InvalidIdentity,

    /// No user with the given id.
    #[error("User not found")]
    UserNotFound,

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingIdentity => (StatusCode::UNAUTHORIZED, "MISSING_IDENTITY"),
            Self::InvalidIdentity => (StatusCode::UNAUTHORIZED, "INVALID_IDENTITY"),
            Self::UserNotFound => (StatusCode::UNAUTHORIZED, "USER_NOT_FOUND"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Middleware to require an identified user.
///
/// # Usage
///
/// Apply to routes that act on behalf of a user:
/// ```ignore
/// Router::new()
///     .route("/protected", get(handler))
///     .layer(axum::middleware::from_fn_with_state(state, require_identity))
/// ```
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingIdentity)?;

    let user_id: Uuid = header.parse().map_err(|_| AuthError::InvalidIdentity)?;

    let user = db::find_user_by_id(&state.db, user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let rank_priority = db::find_user_rank_priority(&state.db, user.id).await?;

    request
        .extensions_mut()
        .insert(AuthUser { user, rank_priority });

    Ok(next.run(request).await)
}

/// Extractor for the identified user in handlers.
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::MissingIdentity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;
    use chrono::Utc;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "tester".into(),
            display_name: "Tester".into(),
            email: None,
            rank_id: None,
            xp: 0,
            level: 1,
            verified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_extractor_reads_injected_identity() {
        let user = sample_user();
        let user_id = user.id;

        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, ()) = request.into_parts();
        parts.extensions.insert(AuthUser {
            user,
            rank_priority: Some(50),
        });

        let auth = AuthUser::from_request_parts(&mut parts, &())
            .await
            .expect("Extractor should find the injected identity");
        assert_eq!(auth.user.id, user_id);
        assert_eq!(auth.rank_priority, Some(50));
    }

    #[tokio::test]
    async fn test_extractor_rejects_without_identity() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, ()) = request.into_parts();

        let result = AuthUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingIdentity)));
    }
}
