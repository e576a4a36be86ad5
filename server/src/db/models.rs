//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model.
///
/// `rank_id` is nullable: a user without a rank has an implicit
/// hierarchy priority of 0 and holds no permissions.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub rank_id: Option<Uuid>,
    pub xp: i64,
    pub level: i32,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rank model.
///
/// `priority` is the single ordering key for the hierarchy; higher
/// outranks lower. Deletion is soft: deleted ranks keep their rows
/// but are excluded from active lookups.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Rank {
    pub id: Uuid,
    pub name: String,
    pub priority: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

/// Room model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub min_level: i32,
    pub required_rank_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Message model. System messages are moderation-authored transcript
/// entries (`is_system` set, `user_id` null).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Option<Uuid>,
    pub content: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

/// Restriction kind: mute and ban share one ledger shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "restriction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RestrictionKind {
    Mute,
    Ban,
}

impl RestrictionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mute => "mute",
            Self::Ban => "ban",
        }
    }
}

/// Restriction ledger row.
///
/// Append-only: reversal sets `expires_at` to the reversal instant
/// instead of deleting the row, so the ledger doubles as an audit
/// trail. `room_id` null means global scope.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Restriction {
    pub id: Uuid,
    pub kind: RestrictionKind,
    pub user_id: Uuid,
    pub moderator_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub ip_address: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Restriction {
    /// Whether this row is active at `now`: not soft-deleted and
    /// either permanent or expiring strictly in the future.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }

    /// Whether this row applies in the given room context. Global
    /// rows match any context; room-scoped rows match only their room.
    #[must_use]
    pub fn applies_in(&self, room_id: Option<Uuid>) -> bool {
        match self.room_id {
            None => true,
            Some(scoped) => room_id == Some(scoped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn restriction(room_id: Option<Uuid>, expires_at: Option<DateTime<Utc>>) -> Restriction {
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
    fn permanent_restriction_is_active() {
        let r = restriction(None, None);
        assert!(r.is_active_at(Utc::now()));
    }

    #[test]
    fn future_expiry_is_active_past_expiry_is_not() {
        let now = Utc::now();
        let r = restriction(None, Some(now + Duration::minutes(60)));
        assert!(r.is_active_at(now));
        assert!(!r.is_active_at(now + Duration::minutes(61)));
    }

    #[test]
    fn expiry_boundary_is_inactive() {
        // Active requires expiry strictly in the future
        let now = Utc::now();
        let r = restriction(None, Some(now));
        assert!(!r.is_active_at(now));
    }

    #[test]
    fn soft_deleted_row_is_inactive() {
        let mut r = restriction(None, None);
        r.deleted_at = Some(Utc::now());
        assert!(!r.is_active_at(Utc::now()));
    }

    #[test]
    fn global_scope_matches_any_room_context() {
        let r = restriction(None, None);
        assert!(r.applies_in(None));
        assert!(r.applies_in(Some(Uuid::new_v4())));
    }

    #[test]
    fn room_scope_matches_only_its_room() {
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let r = restriction(Some(room_a), None);
        assert!(r.applies_in(Some(room_a)));
        assert!(!r.applies_in(Some(room_b)));
        assert!(!r.applies_in(None));
    }
}
