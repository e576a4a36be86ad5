//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).
//!
//! All query functions include error context logging to aid debugging.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::models::{Message, Permission, Rank, Restriction, RestrictionKind, Room, User};

/// Log and return a database error with context.
///
/// This helper ensures all database errors are logged with relevant context
/// before being propagated, making production debugging easier.
macro_rules! db_error {
    ($query:expr) => {
        |e| {
            error!(query = $query, error = %e, "Database query failed");
            e
        }
    };
    ($query:expr, $($field:tt)+) => {
        |e| {
            error!(query = $query, $($field)+, error = %e, "Database query failed");
            e
        }
    };
}

// ============================================================================
// User Queries
// ============================================================================

/// Find user by ID.
pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_id", user_id = %id))
}

/// Find user by username.
pub async fn find_user_by_username(pool: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_username", username = %username))
}

/// Create a new user.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    display_name: &str,
    email: Option<&str>,
) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        r"
        INSERT INTO users (username, display_name, email)
        VALUES ($1, $2, $3)
        RETURNING *
        ",
    )
    .bind(username)
    .bind(display_name)
    .bind(email)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_user", username = %username))
}

/// Overwrite a user's rank reference. Last write wins; promotion does
/// not need ordering guarantees across concurrent actors.
pub async fn update_user_rank(
    pool: &PgPool,
    user_id: Uuid,
    rank_id: Option<Uuid>,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r"
        UPDATE users SET rank_id = $2, updated_at = now()
        WHERE id = $1
        RETURNING *
        ",
    )
    .bind(user_id)
    .bind(rank_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("update_user_rank", user_id = %user_id))
}

/// Atomically add to a user's xp, returning the new total.
pub async fn increment_user_xp(pool: &PgPool, user_id: Uuid, amount: i64) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r"
        UPDATE users SET xp = xp + $2, updated_at = now()
        WHERE id = $1
        RETURNING xp
        ",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(pool)
    .await
    .map_err(db_error!("increment_user_xp", user_id = %user_id))?;

    Ok(row.0)
}

/// Persist a recomputed level.
pub async fn update_user_level(pool: &PgPool, user_id: Uuid, level: i32) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET level = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(level)
        .execute(pool)
        .await
        .map_err(db_error!("update_user_level", user_id = %user_id))?;

    Ok(())
}

/// Mark a user's email as verified.
pub async fn mark_user_verified(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r"
        UPDATE users SET verified_at = now(), updated_at = now()
        WHERE id = $1
        RETURNING *
        ",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("mark_user_verified", user_id = %user_id))
}

// ============================================================================
// Rank Queries
// ============================================================================

/// Find an active (not soft-deleted) rank by ID.
pub async fn find_rank_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Rank>> {
    sqlx::query_as::<_, Rank>("SELECT * FROM ranks WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_rank_by_id", rank_id = %id))
}

/// Find an active rank by name.
pub async fn find_rank_by_name(pool: &PgPool, name: &str) -> sqlx::Result<Option<Rank>> {
    sqlx::query_as::<_, Rank>("SELECT * FROM ranks WHERE name = $1 AND deleted_at IS NULL")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_rank_by_name", name = %name))
}

/// List active ranks, most powerful first.
pub async fn list_ranks(pool: &PgPool) -> sqlx::Result<Vec<Rank>> {
    sqlx::query_as::<_, Rank>(
        "SELECT * FROM ranks WHERE deleted_at IS NULL ORDER BY priority DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_ranks"))
}

/// Create a rank.
pub async fn create_rank(pool: &PgPool, name: &str, priority: i32) -> sqlx::Result<Rank> {
    sqlx::query_as::<_, Rank>(
        r"
        INSERT INTO ranks (name, priority)
        VALUES ($1, $2)
        RETURNING *
        ",
    )
    .bind(name)
    .bind(priority)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_rank", name = %name))
}

/// Update a rank's name and priority.
pub async fn update_rank(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    priority: i32,
) -> sqlx::Result<Option<Rank>> {
    sqlx::query_as::<_, Rank>(
        r"
        UPDATE ranks SET name = $2, priority = $3, updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING *
        ",
    )
    .bind(id)
    .bind(name)
    .bind(priority)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("update_rank", rank_id = %id))
}

/// Soft-delete a rank. The row is retained for historic references
/// but excluded from active lookups. Returns false if no active rank
/// matched.
pub async fn soft_delete_rank(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE ranks SET deleted_at = now(), updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(db_error!("soft_delete_rank", rank_id = %id))?;

    Ok(result.rows_affected() > 0)
}

/// Priority of a user's rank, if the user has an active rank.
pub async fn find_user_rank_priority(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Option<i32>> {
    let row: Option<(i32,)> = sqlx::query_as(
        r"
        SELECT r.priority FROM users u
        JOIN ranks r ON r.id = u.rank_id AND r.deleted_at IS NULL
        WHERE u.id = $1
        ",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("find_user_rank_priority", user_id = %user_id))?;

    Ok(row.map(|(p,)| p))
}

// ============================================================================
// Permission Queries
// ============================================================================

/// List the full permission catalog.
pub async fn list_permissions(pool: &PgPool) -> sqlx::Result<Vec<Permission>> {
    sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY slug")
        .fetch_all(pool)
        .await
        .map_err(db_error!("list_permissions"))
}

/// Permission slugs attached to a rank.
pub async fn list_rank_permission_slugs(pool: &PgPool, rank_id: Uuid) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r"
        SELECT p.slug FROM permissions p
        JOIN rank_permissions rp ON rp.permission_id = p.id
        WHERE rp.rank_id = $1
        ORDER BY p.slug
        ",
    )
    .bind(rank_id)
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_rank_permission_slugs", rank_id = %rank_id))?;

    Ok(rows.into_iter().map(|(s,)| s).collect())
}

/// Whether a rank's permission set contains the given slug.
pub async fn rank_has_permission(pool: &PgPool, rank_id: Uuid, slug: &str) -> sqlx::Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r"
        SELECT EXISTS(
            SELECT 1 FROM rank_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.rank_id = $1 AND p.slug = $2
        )
        ",
    )
    .bind(rank_id)
    .bind(slug)
    .fetch_one(pool)
    .await
    .map_err(db_error!("rank_has_permission", rank_id = %rank_id, slug = %slug))?;

    Ok(row.0)
}

/// Replace a rank's permission set with the given slugs. Unknown
/// slugs are ignored rather than rejected.
pub async fn set_rank_permissions(
    pool: &PgPool,
    rank_id: Uuid,
    slugs: &[String],
) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM rank_permissions WHERE rank_id = $1")
        .bind(rank_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error!("set_rank_permissions.clear", rank_id = %rank_id))?;

    sqlx::query(
        r"
        INSERT INTO rank_permissions (rank_id, permission_id)
        SELECT $1, p.id FROM permissions p WHERE p.slug = ANY($2)
        ",
    )
    .bind(rank_id)
    .bind(slugs)
    .execute(&mut *tx)
    .await
    .map_err(db_error!("set_rank_permissions.insert", rank_id = %rank_id))?;

    tx.commit().await?;
    Ok(())
}

// ============================================================================
// Room Queries
// ============================================================================

/// Find an active room by ID.
pub async fn find_room_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Room>> {
    sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = $1 AND is_active")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_room_by_id", room_id = %id))
}

/// List active rooms.
pub async fn list_rooms(pool: &PgPool) -> sqlx::Result<Vec<Room>> {
    sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE is_active ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(db_error!("list_rooms"))
}

/// Create a room.
pub async fn create_room(
    pool: &PgPool,
    name: &str,
    slug: &str,
    min_level: i32,
    required_rank_id: Option<Uuid>,
) -> sqlx::Result<Room> {
    sqlx::query_as::<_, Room>(
        r"
        INSERT INTO rooms (name, slug, min_level, required_rank_id)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        ",
    )
    .bind(name)
    .bind(slug)
    .bind(min_level)
    .bind(required_rank_id)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_room", slug = %slug))
}

/// Recent messages in a room, oldest first.
pub async fn list_recent_messages(
    pool: &PgPool,
    room_id: Uuid,
    limit: i64,
) -> sqlx::Result<Vec<Message>> {
    sqlx::query_as::<_, Message>(
        r"
        SELECT * FROM (
            SELECT * FROM messages WHERE room_id = $1
            ORDER BY created_at DESC LIMIT $2
        ) recent
        ORDER BY created_at ASC
        ",
    )
    .bind(room_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_recent_messages", room_id = %room_id))
}

/// Append a message to a room transcript.
pub async fn insert_message(
    pool: &PgPool,
    room_id: Uuid,
    user_id: Option<Uuid>,
    content: &str,
    is_system: bool,
) -> sqlx::Result<Message> {
    sqlx::query_as::<_, Message>(
        r"
        INSERT INTO messages (room_id, user_id, content, is_system)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        ",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(content)
    .bind(is_system)
    .fetch_one(pool)
    .await
    .map_err(db_error!("insert_message", room_id = %room_id))
}

// ============================================================================
// Restriction Ledger Queries
// ============================================================================
//
// "Currently restricted" is existence of at least one active,
// scope-matching row, never a unique-row lookup: multiple rows per
// (user, kind) coexist as history.

/// Append a restriction to the ledger.
#[allow(clippy::too_many_arguments)]
pub async fn insert_restriction(
    pool: &PgPool,
    kind: RestrictionKind,
    user_id: Uuid,
    moderator_id: Option<Uuid>,
    room_id: Option<Uuid>,
    expires_at: Option<DateTime<Utc>>,
    reason: &str,
    ip_address: Option<&str>,
) -> sqlx::Result<Restriction> {
    sqlx::query_as::<_, Restriction>(
        r"
        INSERT INTO restrictions (kind, user_id, moderator_id, room_id, expires_at, reason, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        ",
    )
    .bind(kind)
    .bind(user_id)
    .bind(moderator_id)
    .bind(room_id)
    .bind(expires_at)
    .bind(reason)
    .bind(ip_address)
    .fetch_one(pool)
    .await
    .map_err(db_error!("insert_restriction", user_id = %user_id, kind = kind.as_str()))
}

/// Whether the user has an active restriction of the given kind that
/// applies in the given room context. Global rows (`room_id` null)
/// always match; room-scoped rows match only when the context room
/// equals their scope.
pub async fn has_active_restriction(
    pool: &PgPool,
    kind: RestrictionKind,
    user_id: Uuid,
    room_id: Option<Uuid>,
) -> sqlx::Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r"
        SELECT EXISTS(
            SELECT 1 FROM restrictions
            WHERE kind = $1 AND user_id = $2
              AND deleted_at IS NULL
              AND (expires_at IS NULL OR expires_at > now())
              AND (room_id IS NULL OR room_id = $3)
        )
        ",
    )
    .bind(kind)
    .bind(user_id)
    .bind(room_id)
    .fetch_one(pool)
    .await
    .map_err(db_error!("has_active_restriction", user_id = %user_id, kind = kind.as_str()))?;

    Ok(row.0)
}

/// Expire every active restriction of the given kind for the user,
/// regardless of scope. Reversal keeps the rows as audit entries by
/// setting `expires_at = now()`. Returns the number of rows expired;
/// zero is a valid no-op.
pub async fn expire_restrictions_all_scopes(
    pool: &PgPool,
    kind: RestrictionKind,
    user_id: Uuid,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE restrictions SET expires_at = now()
        WHERE kind = $1 AND user_id = $2
          AND deleted_at IS NULL
          AND (expires_at IS NULL OR expires_at > now())
        ",
    )
    .bind(kind)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(db_error!("expire_restrictions_all_scopes", user_id = %user_id, kind = kind.as_str()))?;

    Ok(result.rows_affected())
}

/// Expire active restrictions of the given kind matching exactly one
/// scope: global rows when `room_id` is `None`, otherwise only rows
/// scoped to that room. Other scopes stay untouched.
pub async fn expire_restrictions_in_scope(
    pool: &PgPool,
    kind: RestrictionKind,
    user_id: Uuid,
    room_id: Option<Uuid>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE restrictions SET expires_at = now()
        WHERE kind = $1 AND user_id = $2
          AND deleted_at IS NULL
          AND (expires_at IS NULL OR expires_at > now())
          AND room_id IS NOT DISTINCT FROM $3
        ",
    )
    .bind(kind)
    .bind(user_id)
    .bind(room_id)
    .execute(pool)
    .await
    .map_err(db_error!("expire_restrictions_in_scope", user_id = %user_id, kind = kind.as_str()))?;

    Ok(result.rows_affected())
}

/// Full restriction history for a user, newest first. Includes
/// expired and reversed rows; this is the audit view.
pub async fn list_restrictions_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> sqlx::Result<Vec<Restriction>> {
    sqlx::query_as::<_, Restriction>(
        "SELECT * FROM restrictions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_restrictions_for_user", user_id = %user_id))
}
