//! Moderation broadcast events.
//!
//! Events fan out over Redis pub/sub to the delivery layer. Publishes
//! from the moderation orchestrator are best-effort: a failed publish
//! is logged and never rolls back the ledger write it follows.

use fred::prelude::{Client, Error, PubsubInterface};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Server-to-client moderation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModerationEvent {
    /// User removed from a room. Stateless; nothing stops a rejoin.
    UserKicked {
        user_id: Uuid,
        room_id: Uuid,
        reason: String,
        moderator_name: String,
        room_name: String,
    },
    /// A restriction was placed on or lifted from a user.
    UserRestricted {
        user_id: Uuid,
        action: RestrictionAction,
        reason: String,
        duration_label: String,
        /// ISO 8601 expiry, absent for permanent restrictions.
        expires_at: Option<String>,
        moderator_name: String,
        room_name: Option<String>,
    },
    /// New message in a room (system messages included).
    MessageNew {
        room_id: Uuid,
        message: serde_json::Value,
    },
    /// User gained a higher rank.
    UserPromoted {
        user_id: Uuid,
        rank_name: String,
        priority: i32,
    },
}

/// Moderation actions carried by `UserRestricted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionAction {
    Mute,
    Unmute,
    Ban,
    Unban,
}

/// Redis pub/sub channels.
pub mod channels {
    use uuid::Uuid;

    pub fn room_events(room_id: Uuid) -> String {
        format!("room:{room_id}")
    }

    pub fn user_events(user_id: Uuid) -> String {
        format!("user:{user_id}")
    }
}

/// Publish an event to one channel.
async fn publish(redis: &Client, channel: &str, event: &ModerationEvent) -> Result<(), Error> {
    let payload = serde_json::to_string(event)
        .map_err(|e| Error::new(fred::error::ErrorKind::Parse, format!("JSON error: {e}")))?;

    redis.publish::<(), _, _>(channel, payload).await?;
    Ok(())
}

/// Publish to a room's channel, logging instead of failing.
pub async fn publish_to_room(redis: &Client, room_id: Uuid, event: &ModerationEvent) {
    if let Err(e) = publish(redis, &channels::room_events(room_id), event).await {
        warn!(room_id = %room_id, error = %e, "Failed to publish room event");
    }
}

/// Publish to a user's channel, logging instead of failing.
pub async fn publish_to_user(redis: &Client, user_id: Uuid, event: &ModerationEvent) {
    if let Err(e) = publish(redis, &channels::user_events(user_id), event).await {
        warn!(user_id = %user_id, error = %e, "Failed to publish user event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restriction_event_serializes_with_tag() {
        let event = ModerationEvent::UserRestricted {
            user_id: Uuid::new_v4(),
            action: RestrictionAction::Mute,
            reason: "spam".into(),
            duration_label: "for 60 minutes".into(),
            expires_at: Some("2026-08-25T12:00:00+00:00".into()),
            moderator_name: "mod".into(),
            room_name: None,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_restricted");
        assert_eq!(json["action"], "mute");
        assert_eq!(json["room_name"], serde_json::Value::Null);
    }

    #[test]
    fn test_channel_names() {
        let id = Uuid::new_v4();
        assert_eq!(channels::room_events(id), format!("room:{id}"));
        assert_eq!(channels::user_events(id), format!("user:{id}"));
    }
}
