//! Moderation handlers.
//!
//! Each endpoint does the coarse check here (does the moderator's
//! rank carry the required slug) and leaves the fine hierarchy check
//! to the service layer.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, Restriction, Room, User};
use crate::permissions::{
    self, has_permission, PermissionCache, PermissionError, BAN_ROOM_ACCESS, KICK_USER,
};

use super::service;
use super::types::{
    self, BanRequest, KickRequest, ModerationError, MuteRequest, RestrictionHistoryResponse,
    RestrictionStatusResponse, StatusQuery, UnbanRequest,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}/kick", post(kick_user))
        .route("/{user_id}/mute", post(mute_user))
        .route("/{user_id}/unmute", post(unmute_user))
        .route("/{user_id}/ban", post(ban_user))
        .route("/{user_id}/unban", post(unban_user))
        .route("/{user_id}/restrictions", get(restriction_history))
        .route("/{user_id}/restrictions/status", get(restriction_status))
}

/// Coarse permission gate: the moderator's rank must carry `slug`.
async fn require_slug(
    state: &AppState,
    cache: &mut PermissionCache,
    actor: &User,
    slug: &str,
) -> Result<(), ModerationError> {
    if has_permission(&state.db, cache, actor, slug).await? {
        Ok(())
    } else {
        Err(PermissionError::MissingPermission(slug.to_string()).into())
    }
}

async fn load_target(state: &AppState, user_id: Uuid) -> Result<User, ModerationError> {
    db::find_user_by_id(&state.db, user_id)
        .await?
        .ok_or(ModerationError::TargetNotFound)
}

async fn load_room(state: &AppState, room_id: Uuid) -> Result<Room, ModerationError> {
    db::find_room_by_id(&state.db, room_id)
        .await?
        .ok_or(ModerationError::RoomNotFound)
}

/// The request's network origin: the first hop of `X-Forwarded-For`
/// when a proxy supplied one, otherwise the socket peer.
fn origin_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or_else(|| peer.ip().to_string(), |hop| hop.trim().to_string())
}

/// Kick a user from a room.
///
/// `POST /api/users/:user_id/kick`
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/kick",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = KickRequest,
    responses(
        (status = 204, description = "User kicked"),
        (status = 403, description = "Missing permission or insufficient rank"),
        (status = 404, description = "Target or room not found"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth, request), fields(moderator_id = %auth.user.id))]
pub async fn kick_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<KickRequest>,
) -> Result<axum::http::StatusCode, ModerationError> {
    request
        .validate()
        .map_err(|e| ModerationError::Validation(e.to_string()))?;

    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, KICK_USER).await?;

    let target = load_target(&state, user_id).await?;
    let room = load_room(&state, request.room_id).await?;

    service::kick(
        &state.db,
        &state.redis,
        &auth.user,
        &target,
        &room,
        &request.reason,
    )
    .await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Mute a user.
///
/// `POST /api/users/:user_id/mute`
///
/// A timed mute needs `mute_temp`; a permanent one needs `mute_perm`.
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/mute",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = MuteRequest,
    responses(
        (status = 200, description = "Mute recorded", body = Restriction),
        (status = 403, description = "Missing permission or insufficient rank"),
        (status = 404, description = "Target or room not found"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth, request), fields(moderator_id = %auth.user.id))]
pub async fn mute_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<MuteRequest>,
) -> Result<Json<Restriction>, ModerationError> {
    request
        .validate()
        .map_err(|e| ModerationError::Validation(e.to_string()))?;

    let slug = if request.duration_minutes.is_some() {
        permissions::MUTE_TEMP
    } else {
        permissions::MUTE_PERM
    };

    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, slug).await?;

    let target = load_target(&state, user_id).await?;
    let room = match request.room_id {
        Some(room_id) => Some(load_room(&state, room_id).await?),
        None => None,
    };

    let restriction = service::mute(
        &state.db,
        &state.redis,
        &auth.user,
        &target,
        room.as_ref(),
        request.duration_minutes,
        &request.reason,
    )
    .await?;

    Ok(Json(restriction))
}

/// Lift all active mutes on a user.
///
/// `POST /api/users/:user_id/unmute`
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/unmute",
    params(("user_id" = Uuid, Path, description = "Target user")),
    responses(
        (status = 204, description = "Active mutes lifted (idempotent)"),
        (status = 403, description = "Missing permission or insufficient rank"),
        (status = 404, description = "Target not found"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth), fields(moderator_id = %auth.user.id))]
pub async fn unmute_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ModerationError> {
    // Either mute grade may lift mutes.
    let mut cache = PermissionCache::new();
    let allowed = has_permission(&state.db, &mut cache, &auth.user, permissions::MUTE_TEMP).await?
        || has_permission(&state.db, &mut cache, &auth.user, permissions::MUTE_PERM).await?;
    if !allowed {
        return Err(PermissionError::MissingPermission(permissions::MUTE_TEMP.to_string()).into());
    }

    let target = load_target(&state, user_id).await?;
    service::unmute(&state.db, &state.redis, &auth.user, &target).await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Ban a user.
///
/// `POST /api/users/:user_id/ban`
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/ban",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = BanRequest,
    responses(
        (status = 200, description = "Ban recorded", body = Restriction),
        (status = 403, description = "Missing permission or insufficient rank"),
        (status = 404, description = "Target or room not found"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth, request, headers), fields(moderator_id = %auth.user.id))]
pub async fn ban_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<BanRequest>,
) -> Result<Json<Restriction>, ModerationError> {
    request
        .validate()
        .map_err(|e| ModerationError::Validation(e.to_string()))?;

    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, BAN_ROOM_ACCESS).await?;

    let target = load_target(&state, user_id).await?;
    let room = match request.room_id {
        Some(room_id) => Some(load_room(&state, room_id).await?),
        None => None,
    };

    let origin = origin_address(&headers, peer);
    let restriction = service::ban(
        &state.db,
        &state.redis,
        &auth.user,
        &target,
        room.as_ref(),
        request.duration_minutes,
        &request.reason,
        Some(&origin),
    )
    .await?;

    Ok(Json(restriction))
}

/// Lift a ban in one scope.
///
/// `POST /api/users/:user_id/unban`
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/unban",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = UnbanRequest,
    responses(
        (status = 204, description = "Matching bans lifted (idempotent)"),
        (status = 403, description = "Missing permission or insufficient rank"),
        (status = 404, description = "Target or room not found"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth, request), fields(moderator_id = %auth.user.id))]
pub async fn unban_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UnbanRequest>,
) -> Result<axum::http::StatusCode, ModerationError> {
    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, BAN_ROOM_ACCESS).await?;

    let target = load_target(&state, user_id).await?;
    let room = match request.room_id {
        Some(room_id) => Some(load_room(&state, room_id).await?),
        None => None,
    };

    service::unban(&state.db, &state.redis, &auth.user, &target, room.as_ref()).await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Current mute/ban status for a user in a room context.
///
/// `GET /api/users/:user_id/restrictions/status`
///
/// Users may check their own status; checking someone else's needs a
/// moderation permission.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/restrictions/status",
    params(("user_id" = Uuid, Path, description = "User"), StatusQuery),
    responses(
        (status = 200, description = "Current status", body = RestrictionStatusResponse),
        (status = 403, description = "Missing permission"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn restriction_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<RestrictionStatusResponse>, ModerationError> {
    if auth.user.id != user_id {
        let mut cache = PermissionCache::new();
        require_moderator(&state, &mut cache, &auth.user).await?;
    }

    let muted = service::is_muted(&state.db, user_id, query.room_id).await?;
    let banned = service::is_banned(&state.db, user_id, query.room_id).await?;

    Ok(Json(RestrictionStatusResponse { muted, banned }))
}

/// Full restriction history for a user, newest first, each row
/// annotated with whether it is still in force. Lifted and expired
/// rows are included; the ledger is the audit trail. An optional
/// `room_id` narrows the view to that room's context (global rows
/// always qualify).
///
/// `GET /api/users/:user_id/restrictions`
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/restrictions",
    params(("user_id" = Uuid, Path, description = "User"), StatusQuery),
    responses(
        (status = 200, description = "Restriction history", body = RestrictionHistoryResponse),
        (status = 403, description = "Missing permission"),
    ),
    tag = "moderation"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn restriction_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<RestrictionHistoryResponse>, ModerationError> {
    let mut cache = PermissionCache::new();
    require_moderator(&state, &mut cache, &auth.user).await?;

    let rows = db::list_restrictions_for_user(&state.db, user_id).await?;
    Ok(Json(types::history_response(
        rows,
        query.room_id,
        chrono::Utc::now(),
    )))
}

/// Any moderation slug grants read access to restriction records.
async fn require_moderator(
    state: &AppState,
    cache: &mut PermissionCache,
    actor: &User,
) -> Result<(), ModerationError> {
    for slug in [
        KICK_USER,
        permissions::MUTE_TEMP,
        permissions::MUTE_PERM,
        BAN_ROOM_ACCESS,
    ] {
        if has_permission(&state.db, cache, actor, slug).await? {
            return Ok(());
        }
    }
    Err(PermissionError::MissingPermission(KICK_USER.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_prefers_forwarded_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "192.168.1.5:443".parse().unwrap();
        assert_eq!(origin_address(&headers, peer), "203.0.113.9");
    }

    #[test]
    fn test_origin_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.5:443".parse().unwrap();
        assert_eq!(origin_address(&headers, peer), "192.168.1.5");
    }
}
