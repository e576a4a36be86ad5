//! Moderation orchestration.
//!
//! Each operation runs the fine hierarchy check
//! (`ensure_can_moderate`), writes the restriction ledger, then fires
//! best-effort side effects: a broadcast event and, for room-scoped
//! actions, a system message in the room transcript. Side-effect
//! failures are logged and never roll back the ledger write. The
//! coarse permission check (which slug the moderator's rank must
//! carry) happens upstream in the handlers.

use chrono::{DateTime, Duration, Utc};
use fred::prelude::Client;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::db::{self, Restriction, RestrictionKind, Room, User};
use crate::permissions::ensure_can_moderate;

use super::events::{self, ModerationEvent, RestrictionAction};
use super::types::{duration_label, ModerationError};

/// Verify the moderator outranks the target, loading both priorities.
async fn check_hierarchy(
    pool: &PgPool,
    moderator: &User,
    target: &User,
) -> Result<(), ModerationError> {
    let moderator_priority = db::find_user_rank_priority(pool, moderator.id).await?;
    let target_priority = db::find_user_rank_priority(pool, target.id).await?;
    ensure_can_moderate(moderator_priority, target_priority)?;
    Ok(())
}

/// Expiry timestamp for a duration in minutes; `None` is permanent.
fn expiry_from(duration_minutes: Option<i64>) -> Option<DateTime<Utc>> {
    duration_minutes.map(|m| Utc::now() + Duration::minutes(m))
}

/// Append a system message to a room transcript and broadcast it.
/// Best-effort: failures are logged, not propagated.
async fn post_system_message(pool: &PgPool, redis: &Client, room: &Room, text: &str) {
    match db::insert_message(pool, room.id, None, text, true).await {
        Ok(message) => {
            let event = ModerationEvent::MessageNew {
                room_id: room.id,
                message: serde_json::to_value(&message).unwrap_or_default(),
            };
            events::publish_to_room(redis, room.id, &event).await;
        }
        Err(e) => {
            warn!(room_id = %room.id, error = %e, "Failed to append system message");
        }
    }
}

/// Kick a user from a room.
///
/// Stateless: no ledger row is written and nothing prevents the user
/// from rejoining. Emits a kick event and a system message.
#[tracing::instrument(skip(pool, redis, moderator, target, room), fields(moderator_id = %moderator.id, target_id = %target.id))]
pub async fn kick(
    pool: &PgPool,
    redis: &Client,
    moderator: &User,
    target: &User,
    room: &Room,
    reason: &str,
) -> Result<(), ModerationError> {
    check_hierarchy(pool, moderator, target).await?;

    events::publish_to_user(
        redis,
        target.id,
        &ModerationEvent::UserKicked {
            user_id: target.id,
            room_id: room.id,
            reason: reason.to_string(),
            moderator_name: moderator.display_name.clone(),
            room_name: room.name.clone(),
        },
    )
    .await;

    let text = format!(
        "{} was kicked by {}. Reason: {}",
        target.display_name, moderator.display_name, reason
    );
    post_system_message(pool, redis, room, &text).await;

    Ok(())
}

/// Mute a user, globally or in one room, optionally for a limited
/// number of minutes. Appends a new ledger row; earlier mutes are
/// left untouched as history.
#[tracing::instrument(skip(pool, redis, moderator, target, room), fields(moderator_id = %moderator.id, target_id = %target.id))]
pub async fn mute(
    pool: &PgPool,
    redis: &Client,
    moderator: &User,
    target: &User,
    room: Option<&Room>,
    duration_minutes: Option<i64>,
    reason: &str,
) -> Result<Restriction, ModerationError> {
    check_hierarchy(pool, moderator, target).await?;

    let expires_at = expiry_from(duration_minutes);
    let restriction = db::insert_restriction(
        pool,
        RestrictionKind::Mute,
        target.id,
        Some(moderator.id),
        room.map(|r| r.id),
        expires_at,
        reason,
        None,
    )
    .await?;

    events::publish_to_user(
        redis,
        target.id,
        &ModerationEvent::UserRestricted {
            user_id: target.id,
            action: RestrictionAction::Mute,
            reason: reason.to_string(),
            duration_label: duration_label(duration_minutes),
            expires_at: expires_at.map(|t| t.to_rfc3339()),
            moderator_name: moderator.display_name.clone(),
            room_name: room.map(|r| r.name.clone()),
        },
    )
    .await;

    // Global mutes do not spam every room transcript; only the scoped
    // room gets a system message.
    if let Some(room) = room {
        let text = format!(
            "{} was muted in this room by {} {}. Reason: {}",
            target.display_name,
            moderator.display_name,
            duration_label(duration_minutes),
            reason
        );
        post_system_message(pool, redis, room, &text).await;
    }

    Ok(restriction)
}

/// Lift every active mute on a user, across all scopes.
///
/// A full reset rather than scope-selective: mutes act as a single
/// user-visibility switch. Idempotent; unmuting a user with no active
/// mute is a no-op.
#[tracing::instrument(skip(pool, redis, moderator, target), fields(moderator_id = %moderator.id, target_id = %target.id))]
pub async fn unmute(
    pool: &PgPool,
    redis: &Client,
    moderator: &User,
    target: &User,
) -> Result<u64, ModerationError> {
    check_hierarchy(pool, moderator, target).await?;

    let lifted = db::expire_restrictions_all_scopes(pool, RestrictionKind::Mute, target.id).await?;

    if lifted > 0 {
        events::publish_to_user(
            redis,
            target.id,
            &ModerationEvent::UserRestricted {
                user_id: target.id,
                action: RestrictionAction::Unmute,
                reason: String::new(),
                duration_label: String::new(),
                expires_at: None,
                moderator_name: moderator.display_name.clone(),
                room_name: None,
            },
        )
        .await;
    }

    Ok(lifted)
}

/// Ban a user, recording the acting request's network origin for
/// forensic correlation. Defaults to global scope when no room is
/// given.
#[tracing::instrument(skip(pool, redis, moderator, target, room), fields(moderator_id = %moderator.id, target_id = %target.id))]
#[allow(clippy::too_many_arguments)]
pub async fn ban(
    pool: &PgPool,
    redis: &Client,
    moderator: &User,
    target: &User,
    room: Option<&Room>,
    duration_minutes: Option<i64>,
    reason: &str,
    origin_address: Option<&str>,
) -> Result<Restriction, ModerationError> {
    check_hierarchy(pool, moderator, target).await?;

    let expires_at = expiry_from(duration_minutes);
    let restriction = db::insert_restriction(
        pool,
        RestrictionKind::Ban,
        target.id,
        Some(moderator.id),
        room.map(|r| r.id),
        expires_at,
        reason,
        origin_address,
    )
    .await?;

    events::publish_to_user(
        redis,
        target.id,
        &ModerationEvent::UserRestricted {
            user_id: target.id,
            action: RestrictionAction::Ban,
            reason: reason.to_string(),
            duration_label: duration_label(duration_minutes),
            expires_at: expires_at.map(|t| t.to_rfc3339()),
            moderator_name: moderator.display_name.clone(),
            room_name: room.map(|r| r.name.clone()),
        },
    )
    .await;

    if let Some(room) = room {
        let text = format!(
            "{} was banned from this room by {} {}. Reason: {}",
            target.display_name,
            moderator.display_name,
            duration_label(duration_minutes),
            reason
        );
        post_system_message(pool, redis, room, &text).await;
    }

    Ok(restriction)
}

/// Lift active ban(s) matching one scope: the global ban when `room`
/// is `None`, otherwise only that room's ban. Scope-selective, unlike
/// `unmute`: a global ban and a room ban are independent decisions.
/// Idempotent when nothing matches.
#[tracing::instrument(skip(pool, redis, moderator, target), fields(moderator_id = %moderator.id, target_id = %target.id))]
pub async fn unban(
    pool: &PgPool,
    redis: &Client,
    moderator: &User,
    target: &User,
    room: Option<&Room>,
) -> Result<u64, ModerationError> {
    check_hierarchy(pool, moderator, target).await?;

    let lifted = db::expire_restrictions_in_scope(
        pool,
        RestrictionKind::Ban,
        target.id,
        room.map(|r| r.id),
    )
    .await?;

    if lifted > 0 {
        events::publish_to_user(
            redis,
            target.id,
            &ModerationEvent::UserRestricted {
                user_id: target.id,
                action: RestrictionAction::Unban,
                reason: String::new(),
                duration_label: String::new(),
                expires_at: None,
                moderator_name: moderator.display_name.clone(),
                room_name: room.map(|r| r.name.clone()),
            },
        )
        .await;
    }

    Ok(lifted)
}

/// Whether a user is currently muted in the given room context.
/// A global mute matches regardless of which room, if any, is given.
pub async fn is_muted(
    pool: &PgPool,
    user_id: Uuid,
    room_id: Option<Uuid>,
) -> sqlx::Result<bool> {
    db::has_active_restriction(pool, RestrictionKind::Mute, user_id, room_id).await
}

/// Whether a user is currently banned in the given room context.
pub async fn is_banned(
    pool: &PgPool,
    user_id: Uuid,
    room_id: Option<Uuid>,
) -> sqlx::Result<bool> {
    db::has_active_restriction(pool, RestrictionKind::Ban, user_id, room_id).await
}
