//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth, chat, config::Config, moderation, ranks, rooms, xp::XpAwarder,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Redis client
    pub redis: fred::prelude::Client,
    /// Server configuration
    pub config: Arc<Config>,
    /// XP awarder behind the Redis cooldown lock
    pub xp: XpAwarder,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(db: PgPool, redis: fred::prelude::Client, config: Config, xp: XpAwarder) -> Self {
        Self {
            db,
            redis,
            config: Arc::new(config),
            xp,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Chat surface sits behind the global ban gate on top of identity
    let chat_routes = Router::new()
        .nest("/api/rooms", rooms::router().merge(chat::router()))
        .layer(from_fn_with_state(state.clone(), rooms::require_not_banned));

    let protected_routes = Router::new()
        .merge(chat_routes)
        .nest("/api/users", moderation::handlers::router())
        .nest("/api/ranks", ranks::handlers::router())
        .nest("/api/admin", ranks::handlers::admin_router())
        .route("/api/me", get(me))
        .route("/api/me/verify", post(ranks::handlers::verify_me))
        .layer(from_fn_with_state(state.clone(), auth::require_identity));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// The acting user's own record.
async fn me(auth: auth::AuthUser) -> Json<crate::db::User> {
    Json(auth.user)
}
