//! Rank management handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, Permission, Rank, User};
use crate::permissions::{
    can_assign_rank, has_permission, PermissionCache, PermissionError, MANAGE_RANKS,
    MANAGE_USER_RANKS,
};

use super::service;
use super::types::{
    AssignRankRequest, CreateRankRequest, RankError, RankPermissionsResponse,
    SetRankPermissionsRequest, UpdateRankRequest,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_ranks))
        .route("/assignable", get(list_assignable_ranks))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/permissions", get(list_permission_catalog))
        .route("/ranks", post(create_rank))
        .route("/ranks/{rank_id}", put(update_rank).delete(delete_rank))
        .route(
            "/ranks/{rank_id}/permissions",
            get(get_rank_permissions).put(set_rank_permissions),
        )
        .route("/users/{user_id}/rank", put(assign_user_rank))
}

/// Gate an admin endpoint behind a slug.
async fn require_slug(
    state: &AppState,
    cache: &mut PermissionCache,
    actor: &User,
    slug: &str,
) -> Result<(), RankError> {
    if has_permission(&state.db, cache, actor, slug).await? {
        Ok(())
    } else {
        Err(PermissionError::MissingPermission(slug.to_string()).into())
    }
}

/// List active ranks, highest priority first.
///
/// `GET /api/ranks`
#[utoipa::path(
    get,
    path = "/api/ranks",
    responses((status = 200, description = "Active ranks", body = Vec<Rank>)),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, _auth))]
pub async fn list_ranks(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Rank>>, RankError> {
    Ok(Json(db::list_ranks(&state.db).await?))
}

/// List the ranks the acting user is allowed to assign.
///
/// `GET /api/ranks/assignable`
///
/// Runs the assignment guard per catalog entry. The iterations share
/// one permission cache, so the slug lookup hits the database once
/// and every later iteration is a memo hit.
#[utoipa::path(
    get,
    path = "/api/ranks/assignable",
    responses((status = 200, description = "Assignable ranks", body = Vec<Rank>)),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn list_assignable_ranks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Rank>>, RankError> {
    let mut cache = PermissionCache::new();

    let mut assignable = Vec::new();
    for rank in db::list_ranks(&state.db).await? {
        let has_manage =
            has_permission(&state.db, &mut cache, &auth.user, MANAGE_USER_RANKS).await?;
        if can_assign_rank(has_manage, auth.rank_priority, rank.priority) {
            assignable.push(rank);
        }
    }

    Ok(Json(assignable))
}

/// List the full permission catalog, for the rank-permissions editor.
///
/// `GET /api/admin/permissions`
#[utoipa::path(
    get,
    path = "/api/admin/permissions",
    responses(
        (status = 200, description = "Permission catalog", body = Vec<Permission>),
        (status = 403, description = "Missing permission"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn list_permission_catalog(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Permission>>, RankError> {
    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, MANAGE_RANKS).await?;

    Ok(Json(db::list_permissions(&state.db).await?))
}

/// Create a rank.
///
/// `POST /api/admin/ranks`
#[utoipa::path(
    post,
    path = "/api/admin/ranks",
    request_body = CreateRankRequest,
    responses(
        (status = 201, description = "Rank created", body = Rank),
        (status = 403, description = "Missing permission"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth, request), fields(actor_id = %auth.user.id))]
pub async fn create_rank(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateRankRequest>,
) -> Result<(StatusCode, Json<Rank>), RankError> {
    request
        .validate()
        .map_err(|e| RankError::Validation(e.to_string()))?;

    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, MANAGE_RANKS).await?;

    let rank = db::create_rank(&state.db, &request.name, request.priority).await?;
    Ok((StatusCode::CREATED, Json(rank)))
}

/// Update a rank's name and priority.
///
/// `PUT /api/admin/ranks/:rank_id`
#[utoipa::path(
    put,
    path = "/api/admin/ranks/{rank_id}",
    params(("rank_id" = Uuid, Path, description = "Rank")),
    request_body = UpdateRankRequest,
    responses(
        (status = 200, description = "Rank updated", body = Rank),
        (status = 403, description = "Missing permission"),
        (status = 404, description = "Rank not found"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth, request), fields(actor_id = %auth.user.id))]
pub async fn update_rank(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rank_id): Path<Uuid>,
    Json(request): Json<UpdateRankRequest>,
) -> Result<Json<Rank>, RankError> {
    request
        .validate()
        .map_err(|e| RankError::Validation(e.to_string()))?;

    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, MANAGE_RANKS).await?;

    let rank = db::update_rank(&state.db, rank_id, &request.name, request.priority)
        .await?
        .ok_or(RankError::NotFound)?;

    Ok(Json(rank))
}

/// Soft-delete a rank. Users holding it fall back to rank-less
/// (implicit priority 0) on their next hierarchy lookup.
///
/// `DELETE /api/admin/ranks/:rank_id`
#[utoipa::path(
    delete,
    path = "/api/admin/ranks/{rank_id}",
    params(("rank_id" = Uuid, Path, description = "Rank")),
    responses(
        (status = 204, description = "Rank deleted"),
        (status = 403, description = "Missing permission"),
        (status = 404, description = "Rank not found"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth), fields(actor_id = %auth.user.id))]
pub async fn delete_rank(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rank_id): Path<Uuid>,
) -> Result<StatusCode, RankError> {
    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, MANAGE_RANKS).await?;

    if db::soft_delete_rank(&state.db, rank_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RankError::NotFound)
    }
}

/// List a rank's permission slugs.
///
/// `GET /api/admin/ranks/:rank_id/permissions`
#[utoipa::path(
    get,
    path = "/api/admin/ranks/{rank_id}/permissions",
    params(("rank_id" = Uuid, Path, description = "Rank")),
    responses(
        (status = 200, description = "Rank with slugs", body = RankPermissionsResponse),
        (status = 403, description = "Missing permission"),
        (status = 404, description = "Rank not found"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn get_rank_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rank_id): Path<Uuid>,
) -> Result<Json<RankPermissionsResponse>, RankError> {
    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, MANAGE_RANKS).await?;

    let rank = db::find_rank_by_id(&state.db, rank_id)
        .await?
        .ok_or(RankError::NotFound)?;
    let slugs = db::list_rank_permission_slugs(&state.db, rank_id).await?;

    Ok(Json(RankPermissionsResponse { rank, slugs }))
}

/// Replace a rank's permission slugs.
///
/// `PUT /api/admin/ranks/:rank_id/permissions`
#[utoipa::path(
    put,
    path = "/api/admin/ranks/{rank_id}/permissions",
    params(("rank_id" = Uuid, Path, description = "Rank")),
    request_body = SetRankPermissionsRequest,
    responses(
        (status = 200, description = "Rank with slugs", body = RankPermissionsResponse),
        (status = 403, description = "Missing permission"),
        (status = 404, description = "Rank not found"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth, request), fields(actor_id = %auth.user.id))]
pub async fn set_rank_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rank_id): Path<Uuid>,
    Json(request): Json<SetRankPermissionsRequest>,
) -> Result<Json<RankPermissionsResponse>, RankError> {
    let mut cache = PermissionCache::new();
    require_slug(&state, &mut cache, &auth.user, MANAGE_RANKS).await?;

    let rank = db::find_rank_by_id(&state.db, rank_id)
        .await?
        .ok_or(RankError::NotFound)?;

    db::set_rank_permissions(&state.db, rank_id, &request.slugs).await?;
    let slugs = db::list_rank_permission_slugs(&state.db, rank_id).await?;

    Ok(Json(RankPermissionsResponse { rank, slugs }))
}

/// Assign or clear a user's rank.
///
/// `PUT /api/admin/users/:user_id/rank`
#[utoipa::path(
    put,
    path = "/api/admin/users/{user_id}/rank",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = AssignRankRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 403, description = "Missing permission or insufficient rank"),
        (status = 404, description = "User or rank not found"),
    ),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth, request), fields(actor_id = %auth.user.id))]
pub async fn assign_user_rank(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AssignRankRequest>,
) -> Result<Json<User>, RankError> {
    let mut cache = PermissionCache::new();
    let has_manage =
        has_permission(&state.db, &mut cache, &auth.user, MANAGE_USER_RANKS).await?;

    let target = db::find_user_by_id(&state.db, user_id)
        .await?
        .ok_or(RankError::UserNotFound)?;

    let rank = match request.rank_id {
        Some(rank_id) => Some(
            db::find_rank_by_id(&state.db, rank_id)
                .await?
                .ok_or(RankError::NotFound)?,
        ),
        None => None,
    };

    let updated = service::assign_rank(
        &state.db,
        &state.redis,
        has_manage,
        auth.rank_priority,
        &target,
        rank.as_ref(),
    )
    .await?;

    Ok(Json(updated))
}

/// Mark the acting user verified, granting the entry rank if they
/// have none.
///
/// `POST /api/me/verify`
#[utoipa::path(
    post,
    path = "/api/me/verify",
    responses((status = 200, description = "Verified user", body = User)),
    tag = "ranks"
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user.id))]
pub async fn verify_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, RankError> {
    let user = service::promote_verified(&state.db, &state.redis, &auth.user).await?;
    Ok(Json(user))
}
