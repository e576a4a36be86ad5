//! Rank Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::Rank;
use crate::permissions::PermissionError;

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateRankRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
    #[validate(range(min = 0, message = "Priority cannot be negative"))]
    pub priority: i32,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateRankRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
    #[validate(range(min = 0, message = "Priority cannot be negative"))]
    pub priority: i32,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetRankPermissionsRequest {
    /// Replaces the rank's full slug set.
    pub slugs: Vec<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AssignRankRequest {
    /// Rank to assign; absent clears the user's rank.
    pub rank_id: Option<Uuid>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RankPermissionsResponse {
    pub rank: Rank,
    pub slugs: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("Rank not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Permission(#[from] PermissionError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for RankError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "rank_not_found", "message": "Rank not found"}),
            ),
            Self::UserNotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "user_not_found", "message": "User not found"}),
            ),
            Self::Permission(e) => {
                let body = match e {
                    PermissionError::MissingPermission(slug) => serde_json::json!({
                        "error": "missing_permission",
                        "required": slug,
                        "message": e.to_string()
                    }),
                    PermissionError::RankHierarchy { actor_priority, target_priority } => {
                        serde_json::json!({
                            "error": "rank_hierarchy",
                            "your_priority": actor_priority,
                            "target_priority": target_priority,
                            "message": e.to_string()
                        })
                    }
                    _ => serde_json::json!({
                        "error": "permission",
                        "message": e.to_string()
                    }),
                };
                (StatusCode::FORBIDDEN, body)
            }
            Self::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": "validation", "message": msg}),
            ),
            Self::Database(err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({"error": "database", "message": "Database error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
