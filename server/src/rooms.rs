//! Rooms
//!
//! Room catalog plus the two entry gates: the level/rank access check
//! and the ban gate middleware.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, Room};
use crate::moderation::service as moderation;
use crate::permissions::{
    effective_priority, has_permission, PermissionCache, PermissionError, BAN_ROOM_ACCESS,
    BYPASS_LEVEL_LOCK, MANAGE_ROOMS,
};

/// Whether a user clears a room's entry requirements.
///
/// Two independent floors: the level floor (waived by the bypass
/// permission) and the rank floor, compared on priority only. A room
/// with no required rank has a rank floor of 0, which any user clears.
#[must_use]
pub fn check_access(
    user_level: i32,
    user_priority: Option<i32>,
    has_level_bypass: bool,
    room_min_level: i32,
    required_rank_priority: Option<i32>,
) -> bool {
    let level_ok = has_level_bypass || user_level >= room_min_level;
    let rank_ok =
        effective_priority(user_priority) >= effective_priority(required_rank_priority);
    level_ok && rank_ok
}

/// Resolve a room's rank floor as a priority, if it has one.
pub async fn required_priority(
    pool: &sqlx::PgPool,
    room: &Room,
) -> sqlx::Result<Option<i32>> {
    match room.required_rank_id {
        None => Ok(None),
        Some(rank_id) => Ok(db::find_rank_by_id(pool, rank_id).await?.map(|r| r.priority)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("You are banned")]
    Banned,

    #[error("Room requirements not met")]
    AccessDenied,

    #[error("{0}")]
    Permission(#[from] PermissionError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "room_not_found", "message": "Room not found"}),
            ),
            Self::Banned => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": "banned", "message": "You are banned"}),
            ),
            Self::AccessDenied => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": "access_denied", "message": "Room requirements not met"}),
            ),
            Self::Permission(e) => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": "permission", "message": e.to_string()}),
            ),
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

/// Middleware rejecting globally banned users.
///
/// Applies to the chat surface; room-scoped bans are checked against
/// the concrete room in the handlers. Holders of the ban permission
/// are exempt so a mistaken ban cannot lock out the staff able to
/// lift it.
pub async fn require_not_banned(
    State(state): State<AppState>,
    auth: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, RoomError> {
    if moderation::is_banned(&state.db, auth.user.id, None).await? {
        let mut cache = PermissionCache::new();
        if !has_permission(&state.db, &mut cache, &auth.user, BAN_ROOM_ACCESS).await? {
            return Err(RoomError::Banned);
        }
    }

    Ok(next.run(request).await)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/{room_id}", get(get_room))
        .route("/{room_id}/access", get(check_room_access))
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    pub slug: String,
    #[validate(range(min = 1, message = "Minimum level must be at least 1"))]
    pub min_level: i32,
    pub required_rank_id: Option<Uuid>,
}

/// List active rooms.
///
/// `GET /api/rooms`
#[tracing::instrument(skip(state, _auth))]
pub async fn list_rooms(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Room>>, RoomError> {
    Ok(Json(db::list_rooms(&state.db).await?))
}

/// Fetch one room.
///
/// `GET /api/rooms/:room_id`
#[tracing::instrument(skip(state, _auth))]
pub async fn get_room(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Room>, RoomError> {
    let room = db::find_room_by_id(&state.db, room_id)
        .await?
        .ok_or(RoomError::NotFound)?;
    Ok(Json(room))
}

/// Create a room.
///
/// `POST /api/rooms`
#[tracing::instrument(skip(state, auth, request), fields(actor_id = %auth.user.id))]
pub async fn create_room(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), RoomError> {
    request
        .validate()
        .map_err(|e| RoomError::Validation(e.to_string()))?;

    let mut cache = PermissionCache::new();
    if !has_permission(&state.db, &mut cache, &auth.user, MANAGE_ROOMS).await? {
        return Err(PermissionError::MissingPermission(MANAGE_ROOMS.to_string()).into());
    }

    let room = db::create_room(
        &state.db,
        &request.name,
        &request.slug,
        request.min_level,
        request.required_rank_id,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

/// Report whether the acting user clears a room's entry requirements.
///
/// `GET /api/rooms/:room_id/access`
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user.id))]
pub async fn check_room_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, RoomError> {
    let room = db::find_room_by_id(&state.db, room_id)
        .await?
        .ok_or(RoomError::NotFound)?;

    let mut cache = PermissionCache::new();
    let has_bypass =
        has_permission(&state.db, &mut cache, &auth.user, BYPASS_LEVEL_LOCK).await?;
    let floor = required_priority(&state.db, &room).await?;

    let allowed = check_access(
        auth.user.level,
        auth.rank_priority,
        has_bypass,
        room.min_level,
        floor,
    );

    Ok(Json(serde_json::json!({ "allowed": allowed })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_floor() {
        assert!(check_access(5, None, false, 5, None));
        assert!(!check_access(4, None, false, 5, None));
    }

    #[test]
    fn test_level_bypass_waives_only_the_level_floor() {
        assert!(check_access(1, None, true, 50, None));
        // Bypass does not waive the rank floor
        assert!(!check_access(1, None, true, 50, Some(10)));
    }

    #[test]
    fn test_rank_floor_compares_priority() {
        assert!(check_access(10, Some(50), false, 1, Some(50)));
        assert!(check_access(10, Some(51), false, 1, Some(50)));
        assert!(!check_access(10, Some(49), false, 1, Some(50)));
    }

    #[test]
    fn test_rankless_user_clears_no_rank_floor() {
        // No required rank means floor 0, which priority 0 clears
        assert!(check_access(10, None, false, 1, None));
        assert!(!check_access(10, None, false, 1, Some(1)));
    }
}
