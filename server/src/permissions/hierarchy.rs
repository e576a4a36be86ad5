//! Hierarchy guard logic.
//!
//! Rank priority is the single source of truth for "who outranks
//! whom": every comparison here is on priority, never on rank name,
//! id, or creation order. Comparisons use strict `>` so equal
//! priority always resolves to "cannot act".

/// Priority used in comparisons for a subject with no rank.
///
/// Every call site coalesces a missing rank through this one accessor
/// rather than repeating the null handling.
#[must_use]
pub const fn effective_priority(priority: Option<i32>) -> i32 {
    match priority {
        Some(p) => p,
        None => 0,
    }
}

/// Check if an actor may manage (edit, reassign) a target user.
///
/// Rules:
/// 1. Must hold the manage permission
/// 2. Actor priority must be strictly greater than target priority
///
/// A missing rank on either side counts as priority 0, so two
/// rank-less users can never manage each other.
#[must_use]
pub const fn can_manage_user(
    has_manage_permission: bool,
    actor_priority: Option<i32>,
    target_priority: Option<i32>,
) -> bool {
    has_manage_permission
        && effective_priority(actor_priority) > effective_priority(target_priority)
}

/// Check if an actor may assign a given rank to someone.
///
/// Requires the manage permission and strictly higher priority than
/// the candidate rank, which blocks self-promotion and promotion to
/// a peer rank.
#[must_use]
pub const fn can_assign_rank(
    has_manage_permission: bool,
    actor_priority: Option<i32>,
    rank_priority: i32,
) -> bool {
    has_manage_permission && effective_priority(actor_priority) > rank_priority
}

/// Ensure a moderator outranks a moderation target.
///
/// Fails only when BOTH parties have a rank and the target's priority
/// is greater than or equal to the moderator's. A rank-less target is
/// always moderatable; a rank-less moderator is deliberately not
/// rejected here because the coarse permission check at the call site
/// has already gated entry. Collapsing the two layers would either
/// lock out rank-less staff accounts or open an escalation path.
pub const fn ensure_can_moderate(
    moderator_priority: Option<i32>,
    target_priority: Option<i32>,
) -> Result<(), PermissionError> {
    if let (Some(moderator), Some(target)) = (moderator_priority, target_priority) {
        if target >= moderator {
            return Err(PermissionError::RankHierarchy {
                actor_priority: moderator,
                target_priority: target,
            });
        }
    }
    Ok(())
}

/// Permission check errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// User lacks a required permission slug.
    MissingPermission(String),

    /// Rank hierarchy violation.
    RankHierarchy {
        actor_priority: i32,
        target_priority: i32,
    },

    /// Target user or rank does not exist.
    NotFound,

    /// User lacks permission (generic forbidden).
    Forbidden,

    /// Database error occurred.
    DatabaseError(String),
}

impl std::fmt::Display for PermissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPermission(slug) => write!(f, "Missing permission: {slug}"),
            Self::RankHierarchy {
                actor_priority,
                target_priority,
            } => write!(
                f,
                "Cannot act on priority {target_priority} (your priority: {actor_priority})"
            ),
            Self::NotFound => write!(f, "Target not found"),
            Self::Forbidden => write!(f, "Access forbidden"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
        }
    }
}

impl std::error::Error for PermissionError {}

impl From<sqlx::Error> for PermissionError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
