//! Moderation Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::Restriction;
use crate::permissions::PermissionError;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct KickRequest {
    pub room_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Reason must be 1-255 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct MuteRequest {
    #[validate(length(min = 1, max = 255, message = "Reason must be 1-255 characters"))]
    pub reason: String,
    /// Duration in minutes; absent means permanent.
    #[validate(range(min = 1, message = "Duration must be at least one minute"))]
    pub duration_minutes: Option<i64>,
    /// Room scope; absent means global.
    pub room_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct BanRequest {
    #[validate(length(min = 1, max = 255, message = "Reason must be 1-255 characters"))]
    pub reason: String,
    /// Duration in minutes; absent means permanent.
    #[validate(range(min = 1, message = "Duration must be at least one minute"))]
    pub duration_minutes: Option<i64>,
    /// Room scope; absent means global.
    pub room_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UnbanRequest {
    /// Scope to lift; absent means the global ban. A global ban and a
    /// room ban are independent decisions and are lifted independently.
    pub room_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct StatusQuery {
    pub room_id: Option<Uuid>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RestrictionStatusResponse {
    pub muted: bool,
    pub banned: bool,
}

/// One ledger row annotated with whether it is still in force.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RestrictionHistoryItem {
    pub restriction: Restriction,
    pub active: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RestrictionHistoryResponse {
    pub items: Vec<RestrictionHistoryItem>,
}

/// Build the audit view from raw ledger rows: optionally narrowed to
/// the rows that apply in one room context (global rows always
/// qualify), each annotated with its activity at `now`.
#[must_use]
pub fn history_response(
    rows: Vec<Restriction>,
    room_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> RestrictionHistoryResponse {
    let items = rows
        .into_iter()
        .filter(|r| room_id.is_none() || r.applies_in(room_id))
        .map(|r| {
            let active = r.is_active_at(now);
            RestrictionHistoryItem {
                restriction: r,
                active,
            }
        })
        .collect();

    RestrictionHistoryResponse { items }
}

// ============================================================================
// Helpers
// ============================================================================

/// Human-readable duration label for notification payloads.
#[must_use]
pub fn duration_label(duration_minutes: Option<i64>) -> String {
    match duration_minutes {
        None => "permanently".to_string(),
        Some(1) => "for 1 minute".to_string(),
        Some(m) => format!("for {m} minutes"),
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("Target user not found")]
    TargetNotFound,

    #[error("Room not found")]
    RoomNotFound,

    #[error("{0}")]
    Permission(#[from] PermissionError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::TargetNotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "target_not_found", "message": "Target user not found"}),
            ),
            Self::RoomNotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "room_not_found", "message": "Room not found"}),
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
                            "message": "You cannot moderate a user with equal or higher rank."
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RestrictionKind;
    use chrono::Duration;

    fn row(room_id: Option<Uuid>, expires_at: Option<DateTime<Utc>>) -> Restriction {
        Restriction {
            id: Uuid::new_v4(),
            kind: RestrictionKind::Mute,
            user_id: Uuid::new_v4(),
            moderator_id: None,
            room_id,
            expires_at,
            reason: "test".into(),
            ip_address: None,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_history_annotates_activity() {
        let now = Utc::now();
        let rows = vec![
            row(None, None),
            row(None, Some(now - Duration::minutes(5))),
        ];

        let response = history_response(rows, None, now);
        assert_eq!(response.items.len(), 2);
        assert!(response.items[0].active);
        assert!(!response.items[1].active, "Expired row must read inactive");
    }

    #[test]
    fn test_history_room_filter_keeps_global_rows() {
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let now = Utc::now();
        let rows = vec![row(None, None), row(Some(room_a), None), row(Some(room_b), None)];

        let response = history_response(rows, Some(room_a), now);
        // The global row and the room A row qualify; room B does not
        assert_eq!(response.items.len(), 2);
        assert!(response
            .items
            .iter()
            .all(|i| i.restriction.room_id.is_none()
                || i.restriction.room_id == Some(room_a)));

        // No filter returns the full ledger
        let rows = vec![row(None, None), row(Some(room_a), None)];
        assert_eq!(history_response(rows, None, now).items.len(), 2);
    }

    #[test]
    fn test_duration_label() {
        assert_eq!(duration_label(Some(60)), "for 60 minutes");
        assert_eq!(duration_label(Some(1)), "for 1 minute");
        assert_eq!(duration_label(None), "permanently");
    }
}
