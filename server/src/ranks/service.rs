//! Rank assignment and the verification upgrade.

use fred::prelude::Client;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::db::{self, Rank, User};
use crate::moderation::events::{self, ModerationEvent};
use crate::permissions::{can_assign_rank, can_manage_user, effective_priority, PermissionError};

use super::types::RankError;

/// Name of the rank granted on account verification.
pub const VERIFIED_RANK: &str = "User";

/// Assign (or clear) a user's rank on behalf of an actor.
///
/// The actor must hold `manage_user_ranks`, strictly outrank the
/// target, and strictly outrank the rank being assigned. Both
/// comparisons treat a missing rank as priority 0. A promotion to a
/// higher priority than the target held broadcasts `UserPromoted`.
pub async fn assign_rank(
    pool: &PgPool,
    redis: &Client,
    has_manage_permission: bool,
    actor_priority: Option<i32>,
    target: &User,
    rank: Option<&Rank>,
) -> Result<User, RankError> {
    let target_priority = db::find_user_rank_priority(pool, target.id).await?;

    if !can_manage_user(has_manage_permission, actor_priority, target_priority) {
        if !has_manage_permission {
            return Err(PermissionError::MissingPermission(
                crate::permissions::MANAGE_USER_RANKS.to_string(),
            )
            .into());
        }
        return Err(PermissionError::RankHierarchy {
            actor_priority: effective_priority(actor_priority),
            target_priority: effective_priority(target_priority),
        }
        .into());
    }

    if let Some(rank) = rank {
        if !can_assign_rank(has_manage_permission, actor_priority, rank.priority) {
            return Err(PermissionError::RankHierarchy {
                actor_priority: effective_priority(actor_priority),
                target_priority: rank.priority,
            }
            .into());
        }
    }

    let updated = db::update_user_rank(pool, target.id, rank.map(|r| r.id))
        .await?
        .ok_or(RankError::UserNotFound)?;

    if let Some(rank) = rank {
        if rank.priority > effective_priority(target_priority) {
            events::publish_to_user(
                redis,
                target.id,
                &ModerationEvent::UserPromoted {
                    user_id: target.id,
                    rank_name: rank.name.clone(),
                    priority: rank.priority,
                },
            )
            .await;
        }
    }

    debug!(target_id = %target.id, rank = ?rank.map(|r| &r.name), "Rank assigned");
    Ok(updated)
}

/// Mark a user verified and grant the entry rank if they have none.
///
/// Idempotent on the rank grant: a user who already carries a rank
/// keeps it. Runs outside the moderation hierarchy since the user is
/// upgrading themself.
pub async fn promote_verified(
    pool: &PgPool,
    redis: &Client,
    user: &User,
) -> Result<User, RankError> {
    let verified = db::mark_user_verified(pool, user.id)
        .await?
        .ok_or(RankError::UserNotFound)?;

    if verified.rank_id.is_some() {
        return Ok(verified);
    }

    let Some(rank) = db::find_rank_by_name(pool, VERIFIED_RANK).await? else {
        // Seed rank missing from this deployment; verification still
        // succeeded, so log and return.
        warn!(rank = VERIFIED_RANK, "Entry rank not found, skipping grant");
        return Ok(verified);
    };

    let updated = db::update_user_rank(pool, user.id, Some(rank.id))
        .await?
        .ok_or(RankError::UserNotFound)?;

    events::publish_to_user(
        redis,
        user.id,
        &ModerationEvent::UserPromoted {
            user_id: user.id,
            rank_name: rank.name.clone(),
            priority: rank.priority,
        },
    )
    .await;

    Ok(updated)
}
