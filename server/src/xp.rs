//! XP award limiter.
//!
//! Awards a random amount of experience for chat activity, at most
//! once per cooldown window per user. The window is enforced with a
//! single atomic Redis `SET NX EX` (set-if-absent-with-expiry): two
//! concurrent awards for the same user race on one test-and-set, so
//! at most one wins. A read-then-write pair here would reintroduce
//! the race this module exists to close.

use fred::prelude::{Client, Error, Expiration, KeysInterface, SetOptions};
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, User};
use crate::levels;

/// Award amount bounds, inclusive.
const XP_MIN: i64 = 5;
const XP_MAX: i64 = 15;

/// Outcome of an award attempt.
///
/// A zero `xp_gained` means the cooldown window swallowed the award.
/// That is a normal rate-limited outcome, not an error.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct XpAward {
    pub xp_gained: i64,
    pub leveled_up: bool,
    pub new_level: Option<i32>,
}

impl XpAward {
    /// The no-op result returned when a recent award already
    /// happened inside the cooldown window.
    #[must_use]
    pub const fn rate_limited() -> Self {
        Self {
            xp_gained: 0,
            leveled_up: false,
            new_level: None,
        }
    }
}

/// XP award errors.
#[derive(Debug, thiserror::Error)]
pub enum XpError {
    #[error("Redis error")]
    Redis(#[from] Error),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

/// Awards experience points behind a Redis cooldown lock.
#[derive(Clone)]
pub struct XpAwarder {
    redis: Client,
    cooldown_secs: i64,
    coefficient: i64,
    key_prefix: String,
}

impl XpAwarder {
    /// Create a new awarder sharing the server's Redis connection.
    #[must_use]
    pub fn new(redis: Client, config: &Config) -> Self {
        Self {
            redis,
            cooldown_secs: config.xp_cooldown_secs,
            coefficient: config.level_coefficient,
            key_prefix: config.xp_key_prefix.clone(),
        }
    }

    /// Redis key holding a user's cooldown lock.
    fn cooldown_key(&self, user_id: Uuid) -> String {
        format!("{}:cooldown:{}", self.key_prefix, user_id)
    }

    /// Attempt to award xp to a user.
    ///
    /// Draws a random amount in `[5, 15]`, then tries to acquire the
    /// user's cooldown lock atomically. If a lock from a recent award
    /// is still live the attempt returns `XpAward::rate_limited()`.
    /// On success the xp increment is persisted and the level is
    /// recomputed; a level increase is stored and reported.
    #[tracing::instrument(skip(self, pool, user), fields(user_id = %user.id))]
    pub async fn award(&self, pool: &PgPool, user: &User) -> Result<XpAward, XpError> {
        let amount = rand::thread_rng().gen_range(XP_MIN..=XP_MAX);

        if !self.try_acquire_cooldown(user.id).await? {
            debug!("XP award suppressed by cooldown");
            return Ok(XpAward::rate_limited());
        }

        let new_xp = db::increment_user_xp(pool, user.id, amount).await?;
        let computed = levels::calculate_level(new_xp, self.coefficient);

        if computed > user.level {
            db::update_user_level(pool, user.id, computed).await?;
            debug!(new_level = computed, "User leveled up");
            return Ok(XpAward {
                xp_gained: amount,
                leveled_up: true,
                new_level: Some(computed),
            });
        }

        Ok(XpAward {
            xp_gained: amount,
            leveled_up: false,
            new_level: None,
        })
    }

    /// Atomically acquire the cooldown lock for a user.
    ///
    /// `SET key NX EX cooldown` returns nil when the key already
    /// exists, which is the single test-and-set this limiter's
    /// correctness rests on.
    async fn try_acquire_cooldown(&self, user_id: Uuid) -> Result<bool, Error> {
        let reply: Option<String> = self
            .redis
            .set(
                self.cooldown_key(user_id),
                1,
                Some(Expiration::EX(self.cooldown_secs)),
                Some(SetOptions::NX),
                false,
            )
            .await?;

        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_result_shape() {
        let award = XpAward::rate_limited();
        assert_eq!(award.xp_gained, 0);
        assert!(!award.leveled_up);
        assert_eq!(award.new_level, None);
    }

    #[test]
    fn test_cooldown_key_is_user_scoped() {
        let config = Config::default_for_test();
        let client = Client::new(fred::types::config::Config::default(), None, None, None);
        let awarder = XpAwarder::new(client, &config);

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        assert_ne!(awarder.cooldown_key(alice), awarder.cooldown_key(bob));
        assert!(awarder.cooldown_key(alice).starts_with("rookery-test:xp"));
    }
}
