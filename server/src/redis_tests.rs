//! Redis Integration Tests
//!
//! Exercises the cooldown-lock primitive against a live Redis. Keys
//! are uuid-suffixed so tests do not collide.

#[cfg(test)]
mod redis_tests {
    use fred::prelude::*;
    use std::time::Duration;
    use tokio::time::sleep;
    use uuid::Uuid;

    /// Helper to create a test Redis client
    async fn create_test_redis() -> Client {
        let config = Config::from_url("redis://localhost:6380").unwrap();
        let client = Client::new(config, None, None, None);
        client.connect();
        client
            .wait_for_connect()
            .await
            .expect("Failed to connect to Redis");
        client
    }

    /// Helper to clean up test keys
    async fn cleanup_key(client: &Client, key: &str) {
        let _ = client.del::<(), _>(key).await;
    }

    #[tokio::test]
    async fn test_redis_connection() {
        let client = create_test_redis().await;

        let pong: String = client.ping(None).await.expect("Ping failed");
        assert_eq!(pong, "PONG");
    }

    #[tokio::test]
    async fn test_set_nx_acquires_once() {
        let client = create_test_redis().await;
        let key = format!("rookery-test:xp:cooldown:{}", Uuid::new_v4());

        // First SET NX wins
        let first: Option<String> = client
            .set(&key, 1, Some(Expiration::EX(30)), Some(SetOptions::NX), false)
            .await
            .expect("SET failed");
        assert!(first.is_some());

        // Second SET NX on a live key returns nil
        let second: Option<String> = client
            .set(&key, 1, Some(Expiration::EX(30)), Some(SetOptions::NX), false)
            .await
            .expect("SET failed");
        assert!(second.is_none());

        cleanup_key(&client, &key).await;
    }

    #[tokio::test]
    async fn test_set_nx_reacquires_after_expiry() {
        let client = create_test_redis().await;
        let key = format!("rookery-test:xp:cooldown:{}", Uuid::new_v4());

        let first: Option<String> = client
            .set(&key, 1, Some(Expiration::EX(1)), Some(SetOptions::NX), false)
            .await
            .expect("SET failed");
        assert!(first.is_some());

        sleep(Duration::from_millis(1500)).await;

        let again: Option<String> = client
            .set(&key, 1, Some(Expiration::EX(1)), Some(SetOptions::NX), false)
            .await
            .expect("SET failed");
        assert!(again.is_some(), "Lock should be reacquirable after expiry");

        cleanup_key(&client, &key).await;
    }

    #[tokio::test]
    async fn test_concurrent_set_nx_single_winner() {
        let client = create_test_redis().await;
        let key = format!("rookery-test:xp:cooldown:{}", Uuid::new_v4());

        // Race two acquisitions on one key: exactly one may win
        let a = client.clone();
        let b = client.clone();
        let key_a = key.clone();
        let key_b = key.clone();

        let (first, second): (Option<String>, Option<String>) = tokio::join!(
            async move {
                a.set(&key_a, 1, Some(Expiration::EX(30)), Some(SetOptions::NX), false)
                    .await
                    .expect("SET failed")
            },
            async move {
                b.set(&key_b, 1, Some(Expiration::EX(30)), Some(SetOptions::NX), false)
                    .await
                    .expect("SET failed")
            }
        );

        let winners = usize::from(first.is_some()) + usize::from(second.is_some());
        assert_eq!(winners, 1, "Exactly one concurrent acquire may win");

        cleanup_key(&client, &key).await;
    }

    #[tokio::test]
    async fn test_cooldown_keys_are_user_scoped() {
        let client = create_test_redis().await;
        let key_alice = format!("rookery-test:xp:cooldown:{}", Uuid::new_v4());
        let key_bob = format!("rookery-test:xp:cooldown:{}", Uuid::new_v4());

        let alice: Option<String> = client
            .set(&key_alice, 1, Some(Expiration::EX(30)), Some(SetOptions::NX), false)
            .await
            .expect("SET failed");
        let bob: Option<String> = client
            .set(&key_bob, 1, Some(Expiration::EX(30)), Some(SetOptions::NX), false)
            .await
            .expect("SET failed");

        // One user's cooldown never blocks another's
        assert!(alice.is_some());
        assert!(bob.is_some());

        cleanup_key(&client, &key_alice).await;
        cleanup_key(&client, &key_bob).await;
    }
}
