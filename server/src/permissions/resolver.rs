//! Permission resolution with per-request memoization.
//!
//! `has_permission` answers "does this user's rank carry this slug".
//! Call sites that loop over candidates (e.g. filtering the rank list
//! by assignability) would otherwise hit the database once per
//! iteration, so lookups are memoized in a cache owned by the request.
//! The cache must NOT outlive a request: a process-wide map would
//! serve stale authorization decisions after a rank change.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, User};

/// Request-scoped memo of permission lookups keyed by `(user, slug)`.
///
/// Construct one per logical request and drop it at the boundary.
#[derive(Debug, Default)]
pub struct PermissionCache {
    entries: HashMap<(Uuid, String), bool>,
}

impl PermissionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for a `(user, slug)` pair, if present.
    #[must_use]
    pub fn get(&self, user_id: Uuid, slug: &str) -> Option<bool> {
        self.entries.get(&(user_id, slug.to_string())).copied()
    }

    /// Memoize a lookup result.
    pub fn insert(&mut self, user_id: Uuid, slug: &str, allowed: bool) {
        self.entries.insert((user_id, slug.to_string()), allowed);
    }

    /// Drop all memoized entries. Callers reusing one cache object
    /// across requests must clear it at each request boundary.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Check whether a user holds a permission slug.
///
/// Returns false for users without a rank. Results are memoized in
/// the supplied request-scoped cache.
pub async fn has_permission(
    pool: &PgPool,
    cache: &mut PermissionCache,
    user: &User,
    slug: &str,
) -> sqlx::Result<bool> {
    if let Some(cached) = cache.get(user.id, slug) {
        return Ok(cached);
    }

    let allowed = match user.rank_id {
        None => false,
        Some(rank_id) => db::rank_has_permission(pool, rank_id, slug).await?,
    };

    cache.insert(user.id, slug, allowed);
    Ok(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_miss_then_hit() {
        let mut cache = PermissionCache::new();
        let user_id = Uuid::new_v4();

        assert_eq!(cache.get(user_id, "chat.write"), None);

        cache.insert(user_id, "chat.write", true);
        assert_eq!(cache.get(user_id, "chat.write"), Some(true));
    }

    #[test]
    fn test_cache_keyed_by_user_and_slug() {
        let mut cache = PermissionCache::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        cache.insert(alice, "kick_user", true);
        cache.insert(alice, "manage_ranks", false);

        assert_eq!(cache.get(alice, "kick_user"), Some(true));
        assert_eq!(cache.get(alice, "manage_ranks"), Some(false));
        // Another user's entries are independent
        assert_eq!(cache.get(bob, "kick_user"), None);
    }

    #[test]
    fn test_cache_memoizes_negative_results() {
        let mut cache = PermissionCache::new();
        let user_id = Uuid::new_v4();

        cache.insert(user_id, "ban_room_access", false);
        assert_eq!(cache.get(user_id, "ban_room_access"), Some(false));
    }

    #[test]
    fn test_clear_empties_the_cache() {
        let mut cache = PermissionCache::new();
        let user_id = Uuid::new_v4();

        cache.insert(user_id, "chat.write", true);
        cache.clear();
        assert_eq!(cache.get(user_id, "chat.write"), None);
    }

    #[sqlx::test]
    async fn test_repeated_lookups_are_memoized(pool: PgPool) {
        let rank = db::create_rank(&pool, "Helper", 10)
            .await
            .expect("Failed to create rank");
        db::set_rank_permissions(&pool, rank.id, &["kick_user".to_string()])
            .await
            .expect("Failed to set permissions");
        let created = db::create_user(&pool, "helper", "Helper", None)
            .await
            .expect("Failed to create user");
        let user = db::update_user_rank(&pool, created.id, Some(rank.id))
            .await
            .expect("Query failed")
            .expect("User not found");

        let mut cache = PermissionCache::new();
        assert!(has_permission(&pool, &mut cache, &user, "kick_user")
            .await
            .expect("Lookup failed"));

        // Revoke in the database; the live cache must keep serving the
        // memoized answer for the rest of this request
        db::set_rank_permissions(&pool, rank.id, &[])
            .await
            .expect("Failed to clear permissions");
        assert!(has_permission(&pool, &mut cache, &user, "kick_user")
            .await
            .expect("Lookup failed"));

        // A fresh cache (a new request) sees the revocation
        let mut fresh = PermissionCache::new();
        assert!(!has_permission(&pool, &mut fresh, &user, "kick_user")
            .await
            .expect("Lookup failed"));
    }
}
