//! Chat
//!
//! Message send and transcript reads. Sending runs the full gate
//! chain in order: write permission, room entry requirements, room
//! ban, mute. A successful send also attempts the rate-limited xp
//! award; an award failure is logged and never fails the send.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, Message};
use crate::moderation::events::{self, ModerationEvent};
use crate::moderation::service as moderation;
use crate::permissions::{
    has_permission, PermissionCache, PermissionError, BYPASS_LEVEL_LOCK, CHAT_READ, CHAT_WRITE,
};
use crate::rooms;
use crate::xp::XpAward;

/// Transcript page size for the recent-messages endpoint.
const RECENT_MESSAGE_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{room_id}/messages",
        get(list_messages).post(send_message),
    )
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub content: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SendMessageResponse {
    pub message: Message,
    /// Absent when the award attempt failed outright; a zero award
    /// means the cooldown window was still live.
    pub xp: Option<XpAward>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("You are muted")]
    Muted,

    #[error("You are banned from this room")]
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

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::RoomNotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "room_not_found", "message": "Room not found"}),
            ),
            Self::Muted => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": "muted", "message": "You are muted"}),
            ),
            Self::Banned => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": "banned", "message": "You are banned from this room"}),
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

/// Recent transcript for a room, oldest first.
///
/// `GET /api/rooms/:room_id/messages`
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user.id))]
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ChatError> {
    let mut cache = PermissionCache::new();
    if !has_permission(&state.db, &mut cache, &auth.user, CHAT_READ).await? {
        return Err(PermissionError::MissingPermission(CHAT_READ.to_string()).into());
    }

    let room = db::find_room_by_id(&state.db, room_id)
        .await?
        .ok_or(ChatError::RoomNotFound)?;

    let has_bypass =
        has_permission(&state.db, &mut cache, &auth.user, BYPASS_LEVEL_LOCK).await?;
    let floor = rooms::required_priority(&state.db, &room).await?;
    if !rooms::check_access(
        auth.user.level,
        auth.rank_priority,
        has_bypass,
        room.min_level,
        floor,
    ) {
        return Err(ChatError::AccessDenied);
    }

    let messages =
        db::list_recent_messages(&state.db, room.id, RECENT_MESSAGE_LIMIT).await?;
    Ok(Json(messages))
}

/// Send a message to a room.
///
/// `POST /api/rooms/:room_id/messages`
#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/messages",
    params(("room_id" = Uuid, Path, description = "Room")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = SendMessageResponse),
        (status = 403, description = "Muted, banned, or missing permission"),
        (status = 404, description = "Room not found"),
    ),
    tag = "chat"
)]
#[tracing::instrument(skip(state, auth, request), fields(user_id = %auth.user.id))]
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ChatError> {
    request
        .validate()
        .map_err(|e| ChatError::Validation(e.to_string()))?;

    let mut cache = PermissionCache::new();
    if !has_permission(&state.db, &mut cache, &auth.user, CHAT_WRITE).await? {
        return Err(PermissionError::MissingPermission(CHAT_WRITE.to_string()).into());
    }

    let room = db::find_room_by_id(&state.db, room_id)
        .await?
        .ok_or(ChatError::RoomNotFound)?;

    let has_bypass =
        has_permission(&state.db, &mut cache, &auth.user, BYPASS_LEVEL_LOCK).await?;
    let floor = rooms::required_priority(&state.db, &room).await?;
    if !rooms::check_access(
        auth.user.level,
        auth.rank_priority,
        has_bypass,
        room.min_level,
        floor,
    ) {
        return Err(ChatError::AccessDenied);
    }

    // Global bans are rejected by the router middleware; this catches
    // the room-scoped ones.
    if moderation::is_banned(&state.db, auth.user.id, Some(room.id)).await? {
        return Err(ChatError::Banned);
    }

    if moderation::is_muted(&state.db, auth.user.id, Some(room.id)).await? {
        return Err(ChatError::Muted);
    }

    let message =
        db::insert_message(&state.db, room.id, Some(auth.user.id), &request.content, false)
            .await?;

    events::publish_to_room(
        &state.redis,
        room.id,
        &ModerationEvent::MessageNew {
            room_id: room.id,
            message: serde_json::to_value(&message).unwrap_or_default(),
        },
    )
    .await;

    let xp = match state.xp.award(&state.db, &auth.user).await {
        Ok(award) => Some(award),
        Err(e) => {
            warn!(error = %e, "XP award failed");
            None
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse { message, xp }),
    ))
}
