//! Database Integration Tests
//!
//! Tests for `PostgreSQL` operations. Each test gets a fresh database
//! with migrations (including the seed catalog) applied.

#[cfg(test)]
mod postgres_tests {
    use super::super::*;
    use chrono::{Duration, Utc};
    use sqlx::PgPool;

    async fn seed_user(pool: &PgPool, username: &str) -> User {
        create_user(pool, username, username, None)
            .await
            .expect("Failed to create user")
    }

    async fn seed_room(pool: &PgPool, name: &str) -> Room {
        create_room(pool, name, name, 1, None)
            .await
            .expect("Failed to create room")
    }

    // ========================================================================
    // User Tests
    // ========================================================================

    #[sqlx::test]
    async fn test_create_and_find_user(pool: PgPool) {
        let user = create_user(&pool, "testuser", "Test User", Some("test@example.com"))
            .await
            .expect("Failed to create user");

        assert_eq!(user.username, "testuser");
        assert_eq!(user.rank_id, None);
        assert_eq!(user.xp, 0);
        assert_eq!(user.level, 1);
        assert!(user.verified_at.is_none());

        let found = find_user_by_id(&pool, user.id)
            .await
            .expect("Query failed")
            .expect("User not found");
        assert_eq!(found.id, user.id);

        let found = find_user_by_username(&pool, "testuser")
            .await
            .expect("Query failed")
            .expect("User not found");
        assert_eq!(found.id, user.id);
    }

    #[sqlx::test]
    async fn test_username_uniqueness(pool: PgPool) {
        seed_user(&pool, "duplicate_user").await;

        let result = create_user(&pool, "duplicate_user", "Other", None).await;
        assert!(result.is_err(), "Should fail on duplicate username");
    }

    #[sqlx::test]
    async fn test_xp_increment_returns_new_total(pool: PgPool) {
        let user = seed_user(&pool, "grinder").await;

        let total = increment_user_xp(&pool, user.id, 7)
            .await
            .expect("Increment failed");
        assert_eq!(total, 7);

        let total = increment_user_xp(&pool, user.id, 10)
            .await
            .expect("Increment failed");
        assert_eq!(total, 17);

        update_user_level(&pool, user.id, 2)
            .await
            .expect("Level update failed");
        let found = find_user_by_id(&pool, user.id)
            .await
            .expect("Query failed")
            .expect("User not found");
        assert_eq!(found.xp, 17);
        assert_eq!(found.level, 2);
    }

    #[sqlx::test]
    async fn test_mark_user_verified(pool: PgPool) {
        let user = seed_user(&pool, "newcomer").await;
        assert!(user.verified_at.is_none());

        let verified = mark_user_verified(&pool, user.id)
            .await
            .expect("Query failed")
            .expect("User not found");
        assert!(verified.verified_at.is_some());
    }

    // ========================================================================
    // Rank Tests
    // ========================================================================

    #[sqlx::test]
    async fn test_seeded_ranks_present(pool: PgPool) {
        let admin = find_rank_by_name(&pool, "Admin")
            .await
            .expect("Query failed")
            .expect("Admin rank missing");
        assert_eq!(admin.priority, 100);

        let user = find_rank_by_name(&pool, "User")
            .await
            .expect("Query failed")
            .expect("User rank missing");
        assert_eq!(user.priority, 1);

        // Admin carries the full catalog, User only the chat pair
        assert!(rank_has_permission(&pool, admin.id, "ban_room_access")
            .await
            .expect("Query failed"));
        assert!(rank_has_permission(&pool, user.id, "chat.write")
            .await
            .expect("Query failed"));
        assert!(!rank_has_permission(&pool, user.id, "kick_user")
            .await
            .expect("Query failed"));
    }

    #[sqlx::test]
    async fn test_permission_catalog_listing(pool: PgPool) {
        let permissions = list_permissions(&pool).await.expect("Query failed");

        // The seeded catalog, ordered by slug
        let slugs: Vec<&str> = permissions.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs.len(), 10);
        let mut sorted = slugs.clone();
        sorted.sort_unstable();
        assert_eq!(slugs, sorted);
        assert!(slugs.contains(&"ban_room_access"));
        assert!(slugs.contains(&"bypass.level_lock"));
    }

    #[sqlx::test]
    async fn test_rank_crud_and_soft_delete(pool: PgPool) {
        let rank = create_rank(&pool, "Moderator", 50)
            .await
            .expect("Failed to create rank");
        assert_eq!(rank.priority, 50);

        let updated = update_rank(&pool, rank.id, "Senior Moderator", 60)
            .await
            .expect("Query failed")
            .expect("Rank not found");
        assert_eq!(updated.name, "Senior Moderator");
        assert_eq!(updated.priority, 60);

        // Listed highest priority first
        let ranks = list_ranks(&pool).await.expect("Query failed");
        let priorities: Vec<i32> = ranks.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);

        assert!(soft_delete_rank(&pool, rank.id).await.expect("Query failed"));
        assert!(find_rank_by_id(&pool, rank.id)
            .await
            .expect("Query failed")
            .is_none());
        // Second delete is a no-op
        assert!(!soft_delete_rank(&pool, rank.id).await.expect("Query failed"));
    }

    #[sqlx::test]
    async fn test_rank_permission_assignment(pool: PgPool) {
        let rank = create_rank(&pool, "Helper", 10)
            .await
            .expect("Failed to create rank");

        set_rank_permissions(
            &pool,
            rank.id,
            &["kick_user".to_string(), "mute_temp".to_string()],
        )
        .await
        .expect("Failed to set permissions");

        let slugs = list_rank_permission_slugs(&pool, rank.id)
            .await
            .expect("Query failed");
        assert_eq!(slugs, vec!["kick_user".to_string(), "mute_temp".to_string()]);

        // Replacement is total, not additive
        set_rank_permissions(&pool, rank.id, &["chat.write".to_string()])
            .await
            .expect("Failed to replace permissions");
        let slugs = list_rank_permission_slugs(&pool, rank.id)
            .await
            .expect("Query failed");
        assert_eq!(slugs, vec!["chat.write".to_string()]);
    }

    #[sqlx::test]
    async fn test_user_rank_priority_lookup(pool: PgPool) {
        let user = seed_user(&pool, "ranked").await;

        // Rank-less user has no priority row
        let priority = find_user_rank_priority(&pool, user.id)
            .await
            .expect("Query failed");
        assert_eq!(priority, None);

        let rank = create_rank(&pool, "Moderator", 50)
            .await
            .expect("Failed to create rank");
        update_user_rank(&pool, user.id, Some(rank.id))
            .await
            .expect("Query failed")
            .expect("User not found");

        let priority = find_user_rank_priority(&pool, user.id)
            .await
            .expect("Query failed");
        assert_eq!(priority, Some(50));

        // A soft-deleted rank no longer confers priority
        soft_delete_rank(&pool, rank.id).await.expect("Query failed");
        let priority = find_user_rank_priority(&pool, user.id)
            .await
            .expect("Query failed");
        assert_eq!(priority, None);
    }

    // ========================================================================
    // Restriction Ledger Tests
    // ========================================================================

    #[sqlx::test]
    async fn test_global_mute_lifecycle(pool: PgPool) {
        let target = seed_user(&pool, "loudmouth").await;
        let moderator = seed_user(&pool, "moderator").await;
        let room = seed_room(&pool, "lobby").await;

        insert_restriction(
            &pool,
            RestrictionKind::Mute,
            target.id,
            Some(moderator.id),
            None,
            None,
            "spam",
            None,
        )
        .await
        .expect("Failed to insert restriction");

        // A global mute applies in every room context
        assert!(
            has_active_restriction(&pool, RestrictionKind::Mute, target.id, None)
                .await
                .expect("Query failed")
        );
        assert!(
            has_active_restriction(&pool, RestrictionKind::Mute, target.id, Some(room.id))
                .await
                .expect("Query failed")
        );
        // But it is a mute, not a ban
        assert!(
            !has_active_restriction(&pool, RestrictionKind::Ban, target.id, None)
                .await
                .expect("Query failed")
        );

        let lifted = expire_restrictions_all_scopes(&pool, RestrictionKind::Mute, target.id)
            .await
            .expect("Query failed");
        assert_eq!(lifted, 1);
        assert!(
            !has_active_restriction(&pool, RestrictionKind::Mute, target.id, None)
                .await
                .expect("Query failed")
        );

        // Lifting again is an idempotent no-op
        let lifted = expire_restrictions_all_scopes(&pool, RestrictionKind::Mute, target.id)
            .await
            .expect("Query failed");
        assert_eq!(lifted, 0);
    }

    #[sqlx::test]
    async fn test_room_scoped_mute_stays_in_its_room(pool: PgPool) {
        let target = seed_user(&pool, "rowdy").await;
        let room_a = seed_room(&pool, "room-a").await;
        let room_b = seed_room(&pool, "room-b").await;

        insert_restriction(
            &pool,
            RestrictionKind::Mute,
            target.id,
            None,
            Some(room_a.id),
            None,
            "off topic",
            None,
        )
        .await
        .expect("Failed to insert restriction");

        assert!(
            has_active_restriction(&pool, RestrictionKind::Mute, target.id, Some(room_a.id))
                .await
                .expect("Query failed")
        );
        assert!(
            !has_active_restriction(&pool, RestrictionKind::Mute, target.id, Some(room_b.id))
                .await
                .expect("Query failed")
        );
        // Without a room context only global rows count
        assert!(
            !has_active_restriction(&pool, RestrictionKind::Mute, target.id, None)
                .await
                .expect("Query failed")
        );
    }

    #[sqlx::test]
    async fn test_unban_is_scope_selective(pool: PgPool) {
        let target = seed_user(&pool, "banned_user").await;
        let room = seed_room(&pool, "lounge").await;

        insert_restriction(
            &pool,
            RestrictionKind::Ban,
            target.id,
            None,
            None,
            None,
            "global ban",
            Some("203.0.113.9"),
        )
        .await
        .expect("Failed to insert global ban");
        insert_restriction(
            &pool,
            RestrictionKind::Ban,
            target.id,
            None,
            Some(room.id),
            None,
            "room ban",
            None,
        )
        .await
        .expect("Failed to insert room ban");

        // Lifting the room ban leaves the global ban standing
        let lifted =
            expire_restrictions_in_scope(&pool, RestrictionKind::Ban, target.id, Some(room.id))
                .await
                .expect("Query failed");
        assert_eq!(lifted, 1);
        assert!(
            has_active_restriction(&pool, RestrictionKind::Ban, target.id, None)
                .await
                .expect("Query failed")
        );

        // Lifting the global scope touches only the global row
        let lifted = expire_restrictions_in_scope(&pool, RestrictionKind::Ban, target.id, None)
            .await
            .expect("Query failed");
        assert_eq!(lifted, 1);
        assert!(
            !has_active_restriction(&pool, RestrictionKind::Ban, target.id, Some(room.id))
                .await
                .expect("Query failed")
        );
    }

    #[sqlx::test]
    async fn test_expired_restriction_is_inactive(pool: PgPool) {
        let target = seed_user(&pool, "reformed").await;

        insert_restriction(
            &pool,
            RestrictionKind::Ban,
            target.id,
            None,
            None,
            Some(Utc::now() - Duration::minutes(5)),
            "old ban",
            None,
        )
        .await
        .expect("Failed to insert restriction");

        assert!(
            !has_active_restriction(&pool, RestrictionKind::Ban, target.id, None)
                .await
                .expect("Query failed")
        );
    }

    #[sqlx::test]
    async fn test_ledger_keeps_full_history(pool: PgPool) {
        let target = seed_user(&pool, "repeat_offender").await;

        insert_restriction(
            &pool,
            RestrictionKind::Mute,
            target.id,
            None,
            None,
            None,
            "first",
            None,
        )
        .await
        .expect("insert failed");
        expire_restrictions_all_scopes(&pool, RestrictionKind::Mute, target.id)
            .await
            .expect("expire failed");
        insert_restriction(
            &pool,
            RestrictionKind::Ban,
            target.id,
            None,
            None,
            None,
            "second",
            None,
        )
        .await
        .expect("insert failed");

        // Reversal expires rows instead of deleting them
        let history = list_restrictions_for_user(&pool, target.id)
            .await
            .expect("Query failed");
        assert_eq!(history.len(), 2);
        let mute = history
            .iter()
            .find(|r| r.kind == RestrictionKind::Mute)
            .expect("Mute row missing");
        assert!(mute.expires_at.is_some());
        assert!(mute.deleted_at.is_none());
    }

    // ========================================================================
    // Room and Message Tests
    // ========================================================================

    #[sqlx::test]
    async fn test_room_and_transcript(pool: PgPool) {
        let author = seed_user(&pool, "author").await;
        let room = seed_room(&pool, "general").await;

        let found = find_room_by_id(&pool, room.id)
            .await
            .expect("Query failed")
            .expect("Room not found");
        assert_eq!(found.min_level, 1);

        insert_message(&pool, room.id, Some(author.id), "hello", false)
            .await
            .expect("Insert failed");
        let system = insert_message(&pool, room.id, None, "author was muted", true)
            .await
            .expect("Insert failed");
        assert!(system.is_system);
        assert_eq!(system.user_id, None);

        let messages = list_recent_messages(&pool, room.id, 50)
            .await
            .expect("Query failed");
        assert_eq!(messages.len(), 2);
        // Oldest first
        assert_eq!(messages[0].content, "hello");
    }
}
